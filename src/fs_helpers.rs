use std::fs;
use std::io;
use std::path::Path;

/// Create `dir` (and parents) if absent and make sure the owner can write to it.
pub fn ensure_writable_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut perms = fs::metadata(dir)?.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        if mode & 0o700 != 0o700 {
            perms.set_mode(mode | 0o700);
            fs::set_permissions(dir, perms)?;
        }
    }

    #[cfg(not(unix))]
    {
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(dir, perms)?;
        }
    }

    Ok(())
}

/// Count files and total bytes in a directory.
pub fn count_dir_contents(path: &Path) -> (u32, u64) {
    if !path.exists() {
        return (0, 0);
    }
    let mut count = 0u32;
    let mut bytes = 0u64;
    count_recursive(path, &mut count, &mut bytes);
    (count, bytes)
}

fn count_recursive(path: &Path, count: &mut u32, bytes: &mut u64) {
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                count_recursive(&p, count, bytes);
            } else if let Ok(meta) = entry.metadata() {
                *count += 1;
                *bytes += meta.len();
            }
        }
    }
}

/// Reduce an uploaded name to a bare file name safe to join onto a directory.
pub fn sanitize_file_name(original: &str, fallback: &str) -> String {
    // Both separators, regardless of host platform
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '\0' | ':' | '"'))
        .take(255)
        .collect();

    if clean.is_empty() || clean == "." || clean == ".." {
        fallback.to_string()
    } else {
        clean
    }
}
