use chrono::{DateTime, Local, Utc};

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// Human-readable byte count with up to two decimals, trailing zeros dropped.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".into();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rendered = format!("{:.2}", value);
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// What `get` should fetch: a repository and an optional commit ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub repo: String,
    pub commit_ref: Option<String>,
}

/// Parse `repo`, `repo@ref` or `@ref`; missing parts fall back to
/// `default_repo` and the latest snapshot.
pub fn parse_target(raw: Option<&str>, default_repo: &str) -> Target {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Target {
            repo: default_repo.to_string(),
            commit_ref: None,
        };
    };
    match raw.split_once('@') {
        Some((repo, commit_ref)) => Target {
            repo: if repo.is_empty() {
                default_repo.to_string()
            } else {
                repo.to_string()
            },
            commit_ref: Some(commit_ref.to_string()).filter(|r| !r.is_empty()),
        },
        None => Target {
            repo: raw.to_string(),
            commit_ref: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_scaled() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
    }

    #[test]
    fn targets() {
        assert_eq!(
            parse_target(None, "cwd"),
            Target { repo: "cwd".into(), commit_ref: None }
        );
        assert_eq!(
            parse_target(Some("web"), "cwd"),
            Target { repo: "web".into(), commit_ref: None }
        );
        assert_eq!(
            parse_target(Some("web@20250101_120000"), "cwd"),
            Target { repo: "web".into(), commit_ref: Some("20250101_120000".into()) }
        );
        assert_eq!(
            parse_target(Some("@20250101"), "cwd"),
            Target { repo: "cwd".into(), commit_ref: Some("20250101".into()) }
        );
        assert_eq!(
            parse_target(Some("web@"), "cwd"),
            Target { repo: "web".into(), commit_ref: None }
        );
    }
}
