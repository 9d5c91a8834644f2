//! Minimal OpenSSH `ssh_config` reader exposed as a [`ConfigSource`].
//!
//! Supports `Host` blocks with `*`, `?` and `!` patterns, `Key Value` and
//! `Key=Value` directives, comments and quoted values. Directives before the
//! first `Host` line apply to every alias. `Match` and `Include` are skipped.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::ports::ConfigSource;

#[derive(Debug, Clone)]
struct Block {
    patterns: Vec<String>,
    /// (lowercased key, value) in file order
    entries: Vec<(String, String)>,
}

impl Block {
    fn global() -> Self {
        Self {
            patterns: vec!["*".to_string()],
            entries: Vec::new(),
        }
    }

    /// OpenSSH semantics: any negated match excludes, otherwise any
    /// positive match includes.
    fn matches(&self, alias: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                if wildcard_match(alias, negated) {
                    return false;
                }
            } else if wildcard_match(alias, pattern) {
                matched = true;
            }
        }
        matched
    }
}

/// Host configuration parsed from an `ssh_config` file.
#[derive(Debug, Clone, Default)]
pub struct SshConfigSource {
    blocks: Vec<Block>,
}

impl SshConfigSource {
    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        let source = Self::parse(&content);
        debug!(path = %path.display(), blocks = source.blocks.len(), "Loaded ssh_config");
        Ok(source)
    }

    /// Parse `ssh_config` content.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut blocks = vec![Block::global()];
        let mut skipping = false;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = parse_directive(line) else {
                continue;
            };

            if key.eq_ignore_ascii_case("Host") {
                skipping = false;
                blocks.push(Block {
                    patterns: value.split_whitespace().map(unquote).collect(),
                    entries: Vec::new(),
                });
            } else if key.eq_ignore_ascii_case("Match") {
                debug!(criteria = %value, "Match blocks are not supported, skipping");
                skipping = true;
            } else if key.eq_ignore_ascii_case("Include") {
                debug!(path = %value, "Include is not supported, skipping");
            } else if !skipping && let Some(block) = blocks.last_mut() {
                block
                    .entries
                    .push((key.to_ascii_lowercase(), unquote(value)));
            }
        }

        Self { blocks }
    }

    fn values<'a>(&'a self, alias: &'a str, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        let key = key.to_ascii_lowercase();
        self.blocks
            .iter()
            .filter(move |block| block.matches(alias))
            .flat_map(|block| block.entries.iter())
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl ConfigSource for SshConfigSource {
    fn lookup(&self, alias: &str, key: &str) -> Option<String> {
        self.values(alias, key).next().map(str::to_string)
    }

    fn lookup_all(&self, alias: &str, key: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self.values(alias, key).map(str::to_string).collect();
        (!values.is_empty()).then_some(values)
    }
}

/// Parse a single SSH config directive line into (key, value).
fn parse_directive(line: &str) -> Option<(&str, &str)> {
    let key_end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let key = &line[..key_end];
    if key.is_empty() {
        return None;
    }

    let rest = line[key_end..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    Some((key, rest))
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Case-insensitive glob match supporting `*` and `?`.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len()
            && (pattern[p] == '?' || pattern[p].eq_ignore_ascii_case(&text[t]))
        {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
# Jump through the bastion for everything internal
Host bastion
    HostName bastion.example.com
    User ops
    Port 2200

Host *.internal !legacy.internal
    ProxyJump bastion
    IdentityFile ~/.ssh/internal_ed25519

Host db
    HostName=db.internal
    User "dba"
    IdentityFile ~/.ssh/db_ed25519

Host *
    User fallback
    IdentityFile ~/.ssh/id_ed25519
"#;

    // ============== Parsing ==============

    #[test]
    fn test_parse_empty_config() {
        let source = SshConfigSource::parse("");
        assert_eq!(source.lookup("db", "User"), None);
        assert_eq!(source.lookup_all("db", "User"), None);
    }

    #[test]
    fn test_parse_comments_only() {
        let source = SshConfigSource::parse("# a comment\n   # another\n");
        assert_eq!(source.lookup("db", "HostName"), None);
    }

    #[test]
    fn test_parse_directive_forms() {
        assert_eq!(parse_directive("Port 22"), Some(("Port", "22")));
        assert_eq!(parse_directive("Port=22"), Some(("Port", "22")));
        assert_eq!(parse_directive("Port = 22"), Some(("Port", "22")));
        assert_eq!(parse_directive("LocalForward"), Some(("LocalForward", "")));
        assert_eq!(parse_directive("=22"), None);
    }

    // ============== Lookup ==============

    #[test]
    fn test_first_obtained_value_wins() {
        let source = SshConfigSource::parse(SAMPLE);
        assert_eq!(source.lookup("bastion", "User").as_deref(), Some("ops"));
        assert_eq!(source.lookup("db", "user").as_deref(), Some("dba"));
        assert_eq!(source.lookup("web", "User").as_deref(), Some("fallback"));
    }

    #[test]
    fn test_key_value_with_equals() {
        let source = SshConfigSource::parse(SAMPLE);
        assert_eq!(
            source.lookup("db", "Hostname").as_deref(),
            Some("db.internal")
        );
    }

    #[test]
    fn test_wildcard_and_negated_patterns() {
        let source = SshConfigSource::parse(SAMPLE);
        assert_eq!(
            source.lookup("cache.internal", "ProxyJump").as_deref(),
            Some("bastion")
        );
        assert_eq!(source.lookup("legacy.internal", "ProxyJump"), None);
        assert_eq!(source.lookup("db", "ProxyJump"), None);
    }

    #[test]
    fn test_lookup_all_collects_in_file_order() {
        let source = SshConfigSource::parse(SAMPLE);
        assert_eq!(
            source.lookup_all("cache.internal", "IdentityFile"),
            Some(vec![
                "~/.ssh/internal_ed25519".to_string(),
                "~/.ssh/id_ed25519".to_string()
            ])
        );
    }

    #[test]
    fn test_global_directives_apply_everywhere() {
        let source = SshConfigSource::parse("Compression no\nHost db\n  Port 2222\n");
        assert_eq!(source.lookup("db", "Compression").as_deref(), Some("no"));
        assert_eq!(source.lookup("web", "Compression").as_deref(), Some("no"));
        assert_eq!(source.lookup("web", "Port"), None);
    }

    #[test]
    fn test_match_block_is_skipped() {
        let source =
            SshConfigSource::parse("Match exec \"true\"\n  User matched\nHost *\n  User all\n");
        assert_eq!(source.lookup("db", "User").as_deref(), Some("all"));
    }

    // ============== Patterns ==============

    #[test]
    fn test_wildcard_matching() {
        assert!(wildcard_match("web1.example.com", "web*.example.com"));
        assert!(wildcard_match("WEB1.example.com", "web?.example.com"));
        assert!(!wildcard_match("db1.example.com", "web*.example.com"));
        assert!(!wildcard_match("testing", "?est"));
        assert!(wildcard_match("anything", "*"));
        assert!(wildcard_match("", "*"));
        assert!(wildcard_match("a.b.c", "*.*.c"));
    }

    // ============== Files ==============

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Host db\n  Port 2222").unwrap();
        let source = SshConfigSource::from_path(file.path()).unwrap();
        assert_eq!(source.lookup("db", "Port").as_deref(), Some("2222"));
    }

    #[test]
    fn test_from_missing_path() {
        let result = SshConfigSource::from_path(Path::new("/nonexistent/ssh_config"));
        assert!(result.is_err());
    }
}
