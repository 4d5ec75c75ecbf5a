use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const CHECKED_EXTENSIONS: &[&str] = &["rs", "md", "yaml", "toml"];

const EXCLUDED_DIRS: &[&str] = &["target", ".git", "examples"];

const EXCLUDED_FILES: &[&str] = &["Cargo.lock"];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/packed-refs");

    let sha = git(&["rev-parse", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=FICHES_GIT_SHA={}", sha);

    // Commit timestamp (Unix epoch seconds)
    let timestamp = git(&["show", "-s", "--format=%ct", "HEAD"])
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    println!("cargo:rustc-env=FICHES_BUILD_TIMESTAMP={}", timestamp);

    let root = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let files = collect_files(&root, &root);
    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    enforce_line_limits(&root, &files);
    enforce_no_dead_code_allows(&root, &files);
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn collect_files(dir: &Path, root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files = Vec::new();
    for path in entries.flatten().map(|e| e.path()) {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if path.is_dir() {
            if !EXCLUDED_DIRS.contains(&name) {
                files.extend(collect_files(&path, root));
            }
            continue;
        }
        let checked = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| CHECKED_EXTENSIONS.contains(&ext));
        let excluded = path
            .strip_prefix(root)
            .map(|rel| EXCLUDED_FILES.iter().any(|f| rel == Path::new(f)))
            .unwrap_or(false);
        if checked && !excluded {
            files.push(path);
        }
    }
    files
}

fn report(title: &str, hint: &[&str], violations: &[String]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================");
    for v in violations {
        eprintln!("  {}", v);
    }
    eprintln!("========================================");
    for line in hint {
        eprintln!("{}", line);
    }
    eprintln!();
    panic!("Build failed: {} ({} occurrence(s))", title, violations.len());
}

fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let violations: Vec<String> = files
        .iter()
        .filter_map(|file| {
            let content = std::fs::read_to_string(file).ok()?;
            let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
            (lines > MAX_LINES).then(|| {
                let rel = file.strip_prefix(root).unwrap_or(file);
                format!("{} - {} lines (exceeds by {})", rel.display(), lines, lines - MAX_LINES)
            })
        })
        .collect();

    report(
        &format!("FILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES),
        &["Please split these files into smaller modules."],
        &violations,
    );
}

fn enforce_no_dead_code_allows(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in files {
        let is_source = file.extension().and_then(|e| e.to_str()) == Some("rs")
            && file.file_name().and_then(|n| n.to_str()) != Some("build.rs");
        let Some(content) = is_source.then(|| std::fs::read_to_string(file).ok()).flatten() else {
            continue;
        };
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                let rel = file.strip_prefix(root).unwrap_or(file);
                violations.push(format!("{}:{}  {}", rel.display(), line_num + 1, trimmed));
            }
        }
    }

    report(
        "#[allow(dead_code)] IS NOT ALLOWED",
        &[
            "Delete unused code instead of silencing the warning.",
            "Code only used by tests belongs behind #[cfg(test)].",
        ],
        &violations,
    );
}
