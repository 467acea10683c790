//! Docker build context fingerprinting.

use std::fs;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{IacError, IacResult};

/// Directories never part of the build context hash.
const ALWAYS_EXCLUDED: &[&str] = &[".git", "node_modules"];

/// Hash the build context at `dir`.
///
/// Files are visited in sorted order; both relative paths and contents feed
/// the hash. Patterns from `.dockerignore` are honored.
pub fn fingerprint(dir: &Path) -> IacResult<String> {
    let ignore = load_dockerignore(dir)?;
    let mut hasher = blake3::Hasher::new();
    let mut files = 0usize;

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !ALWAYS_EXCLUDED
                    .iter()
                    .any(|name| e.file_name().to_string_lossy() == *name)
        });

    for entry in walker {
        let entry = entry.map_err(|e| IacError::Fingerprint {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if is_ignored(&ignore, relative) {
            continue;
        }

        let relative = relative.to_string_lossy().replace('\\', "/");
        hasher.update(relative.as_bytes());
        hasher.update(&[0]);
        hasher.update(&fs::read(entry.path())?);
        hasher.update(&[0]);
        files += 1;
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!("Fingerprinted {} files in {:?}: {}", files, dir, hash);
    Ok(hash)
}

/// One `.dockerignore` line. Negated rules put paths back into the context.
#[derive(Debug)]
struct IgnoreRule {
    patterns: Vec<Pattern>,
    negated: bool,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Rules apply in file order; the last matching rule decides.
fn is_ignored(rules: &[IgnoreRule], relative: &Path) -> bool {
    let mut ignored = false;
    for rule in rules {
        if rule.patterns.iter().any(|p| p.matches_path_with(relative, MATCH_OPTIONS)) {
            ignored = !rule.negated;
        }
    }
    ignored
}

fn load_dockerignore(dir: &Path) -> IacResult<Vec<IgnoreRule>> {
    let path = dir.join(".dockerignore");
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path)?;
    let mut rules = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (negated, line) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let line = line.trim_start_matches("./").trim_matches('/');
        if line.is_empty() {
            continue;
        }

        let mut patterns = Vec::new();
        match Pattern::new(line) {
            Ok(p) => patterns.push(p),
            Err(e) => {
                debug!("Skipping .dockerignore pattern '{}': {}", line, e);
                continue;
            }
        }
        // A matched directory also covers everything under it.
        if let Ok(p) = Pattern::new(&format!("{}/**", line)) {
            patterns.push(p);
        }
        rules.push(IgnoreRule { patterns, negated });
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM node:20\n").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let first = fingerprint(dir.path()).unwrap();
        assert_eq!(first, fingerprint(dir.path()).unwrap());
        assert_eq!(first.len(), 64);

        fs::write(dir.path().join("package.json"), "{\"name\":\"duo\"}").unwrap();
        assert_ne!(first, fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn test_fingerprint_skips_ignored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM node:20\n").unwrap();
        fs::write(dir.path().join(".dockerignore"), "# local\n*.log\ncoverage/\n").unwrap();
        let base = fingerprint(dir.path()).unwrap();

        fs::write(dir.path().join("debug.log"), "noise").unwrap();
        fs::create_dir_all(dir.path().join("coverage")).unwrap();
        fs::write(dir.path().join("coverage/lcov.info"), "noise").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/react")).unwrap();
        fs::write(dir.path().join("node_modules/react/index.js"), "noise").unwrap();

        assert_eq!(base, fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn test_fingerprint_honors_negated_patterns() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM node:20\n").unwrap();
        fs::write(dir.path().join(".dockerignore"), "*.md\n!README.md\n").unwrap();
        fs::write(dir.path().join("README.md"), "v1").unwrap();
        fs::write(dir.path().join("NOTES.md"), "v1").unwrap();
        let base = fingerprint(dir.path()).unwrap();

        fs::write(dir.path().join("NOTES.md"), "v2 changed").unwrap();
        assert_eq!(base, fingerprint(dir.path()).unwrap());

        fs::write(dir.path().join("README.md"), "v2 changed").unwrap();
        assert_ne!(base, fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn test_only_git_and_node_modules_always_excluded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM node:20\n").unwrap();
        fs::create_dir_all(dir.path().join(".next")).unwrap();
        fs::write(dir.path().join(".next/BUILD_ID"), "v1").unwrap();
        let base = fingerprint(dir.path()).unwrap();

        fs::write(dir.path().join(".next/BUILD_ID"), "v2").unwrap();
        assert_ne!(base, fingerprint(dir.path()).unwrap());

        fs::write(dir.path().join(".dockerignore"), ".next\n").unwrap();
        let ignored = fingerprint(dir.path()).unwrap();
        fs::write(dir.path().join(".next/BUILD_ID"), "v3").unwrap();
        assert_eq!(ignored, fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM node:20\n").unwrap();
        fs::write(dir.path().join(".dockerignore"), "*.log\n").unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        fs::write(dir.path().join("logs/app.log"), "v1").unwrap();
        let base = fingerprint(dir.path()).unwrap();

        fs::write(dir.path().join("logs/app.log"), "v2").unwrap();
        assert_ne!(base, fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let rules = vec![
            IgnoreRule {
                patterns: vec![Pattern::new("docs").unwrap(), Pattern::new("docs/**").unwrap()],
                negated: false,
            },
            IgnoreRule {
                patterns: vec![Pattern::new("docs/api.md").unwrap()],
                negated: true,
            },
        ];

        assert!(is_ignored(&rules, Path::new("docs/guide.md")));
        assert!(!is_ignored(&rules, Path::new("docs/api.md")));
        assert!(!is_ignored(&rules, Path::new("src/main.ts")));
    }
}
