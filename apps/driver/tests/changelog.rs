//! Lint of the repository's CHANGELOG.md (Keep a Changelog format)

use regex::Regex;
use std::path::PathBuf;

/// Semantic Versioning 2.0.0 grammar
const SEMVER: &str = r"(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?";

#[derive(Debug)]
enum Section {
    Unreleased { line: usize },
    Release {
        line: usize,
        version: String,
        date: String,
    },
}

#[derive(Debug, Default)]
struct Changelog {
    sections: Vec<Section>,
    /// Bullets of "### Added" subsections: (line, text)
    added: Vec<(usize, String)>,
    /// Level 2 headers that are neither "Unreleased" nor a release
    invalid_headers: Vec<(usize, String)>,
}

fn changelog_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../CHANGELOG.md")
}

fn parse(content: &str) -> Changelog {
    let release = Regex::new(&format!(
        r"^## \[?v?(?P<version>{})\]? - (?P<date>\S+)$",
        SEMVER
    ))
    .unwrap();

    let mut changelog = Changelog::default();
    let mut in_added = false;

    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim_end();

        if let Some(header) = trimmed.strip_prefix("## ") {
            in_added = false;

            if header.trim_matches(|c| c == '[' || c == ']') == "Unreleased" {
                changelog.sections.push(Section::Unreleased { line: line_number });
            } else if let Some(captures) = release.captures(trimmed) {
                changelog.sections.push(Section::Release {
                    line: line_number,
                    version: captures["version"].to_string(),
                    date: captures["date"].to_string(),
                });
            } else {
                changelog
                    .invalid_headers
                    .push((line_number, trimmed.to_string()));
            }
            continue;
        }

        if let Some(subsection) = trimmed.strip_prefix("### ") {
            in_added = subsection.trim() == "Added";
            continue;
        }

        if in_added {
            if let Some(bullet) = trimmed
                .strip_prefix('-')
                .or_else(|| trimmed.strip_prefix('*'))
            {
                changelog
                    .added
                    .push((line_number, bullet.trim().to_string()));
            }
        }
    }

    changelog
}

fn load() -> Changelog {
    let path = changelog_path();
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e));
    parse(&content)
}

fn releases(changelog: &Changelog) -> Vec<(usize, &str, &str)> {
    changelog
        .sections
        .iter()
        .filter_map(|s| match s {
            Section::Release {
                line,
                version,
                date,
            } => Some((*line, version.as_str(), date.as_str())),
            Section::Unreleased { .. } => None,
        })
        .collect()
}

#[test]
fn test_release_headers_are_well_formed() {
    let changelog = load();
    assert!(
        changelog.invalid_headers.is_empty(),
        "invalid section headers: {:?}",
        changelog.invalid_headers
    );
    assert!(!releases(&changelog).is_empty(), "no release sections");
}

#[test]
fn test_release_versions_are_semver() {
    let semver = Regex::new(&format!("^{}$", SEMVER)).unwrap();

    for (line, version, _) in releases(&load()) {
        assert!(
            semver.is_match(version),
            "line {}: {} is not a semantic version",
            line,
            version
        );
    }
}

#[test]
fn test_release_dates_newest_first() {
    let date = Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").unwrap();

    let changelog = load();
    let releases = releases(&changelog);
    for (line, _, release_date) in &releases {
        assert!(
            date.is_match(release_date),
            "line {}: {} is not a YYYY-MM-DD date",
            line,
            release_date
        );
    }

    // ISO dates compare chronologically as strings
    for pair in releases.windows(2) {
        let (newer_line, _, newer) = pair[0];
        let (older_line, _, older) = pair[1];
        assert!(
            newer >= older,
            "line {} ({}) is older than line {} ({})",
            newer_line,
            newer,
            older_line,
            older
        );
    }
}

#[test]
fn test_unreleased_once_and_first() {
    let changelog = load();

    let unreleased: Vec<usize> = changelog
        .sections
        .iter()
        .filter_map(|s| match s {
            Section::Unreleased { line } => Some(*line),
            Section::Release { .. } => None,
        })
        .collect();
    assert_eq!(
        unreleased.len(),
        1,
        "expected exactly one Unreleased section, found at lines {:?}",
        unreleased
    );

    assert!(
        matches!(changelog.sections.first(), Some(Section::Unreleased { .. })),
        "Unreleased must precede all releases"
    );
}

#[test]
fn test_added_bullets_not_empty() {
    let changelog = load();
    assert!(!changelog.added.is_empty(), "no Added entries");

    for (line, text) in &changelog.added {
        assert!(!text.is_empty(), "line {}: empty Added bullet", line);
    }
}

#[test]
fn test_parser_detects_problems() {
    let changelog = parse(
        "# Changelog\n\
         ## v0.2.0 - 2025-01-01\n\
         ### Added\n\
         -\n\
         ## Unreleased\n\
         ## v0.1 - 2025-02-01\n",
    );

    assert!(matches!(
        changelog.sections.first(),
        Some(Section::Release { .. })
    ));
    assert_eq!(changelog.added, vec![(4, String::new())]);
    assert_eq!(
        changelog.invalid_headers,
        vec![(6, "## v0.1 - 2025-02-01".to_string())]
    );
}
