fn main() -> std::process::ExitCode {
    flatfile_ingress::run()
}
