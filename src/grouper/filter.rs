//! Exclude and normalize rules that turn a raw cgroup path or process name
//! into a group name.

use regex::Regex;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    normalize: Option<Regex>,
    exclude: Option<Regex>,
}

impl GroupFilter {
    /// Sets the normalize rule. The pattern must have exactly one capture
    /// group; its match becomes the group name. An empty pattern clears the rule.
    pub fn set_normalize_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        if pattern.is_empty() {
            self.normalize = None;
            return Ok(());
        }
        let re = compile(pattern)?;
        // captures_len counts the implicit whole-match group.
        let found = re.captures_len() - 1;
        if found != 1 {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                found,
            });
        }
        self.normalize = Some(re);
        Ok(())
    }

    /// Sets the exclude rule. An empty pattern clears the rule.
    pub fn set_exclude_regexp(&mut self, pattern: &str) -> Result<(), ConfigError> {
        self.exclude = if pattern.is_empty() {
            None
        } else {
            Some(compile(pattern)?)
        };
        Ok(())
    }

    /// Maps a raw path or name to a group name.
    ///
    /// Excluded names yield `None` even if the normalize rule would match.
    /// Names the normalize rule does not match are kept as they are. An empty
    /// result never becomes a group.
    pub fn apply(&self, raw: &str) -> Option<String> {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(raw)) {
            return None;
        }
        let name = match &self.normalize {
            Some(re) => re
                .captures(raw)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .unwrap_or(raw),
            None => raw,
        };
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegexp {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_requires_exactly_one_capture() {
        let mut f = GroupFilter::default();
        assert!(matches!(
            f.set_normalize_regexp("^/app/.+$"),
            Err(ConfigError::InvalidPattern { found: 0, .. })
        ));
        assert!(matches!(
            f.set_normalize_regexp("^/(app)/(.+)$"),
            Err(ConfigError::InvalidPattern { found: 2, .. })
        ));
        assert!(f.set_normalize_regexp("^/app/(.+)$").is_ok());
    }

    #[test]
    fn test_invalid_regexp_is_rejected() {
        let mut f = GroupFilter::default();
        assert!(matches!(
            f.set_normalize_regexp("^/app/(.+$"),
            Err(ConfigError::InvalidRegexp { .. })
        ));
        assert!(matches!(
            f.set_exclude_regexp("[unclosed"),
            Err(ConfigError::InvalidRegexp { .. })
        ));
    }

    #[test]
    fn test_non_capturing_groups_do_not_count() {
        let mut f = GroupFilter::default();
        assert!(f.set_normalize_regexp("^/(?:system|user)\\.slice/(.+)$").is_ok());
        assert_eq!(
            f.apply("/system.slice/sshd.service"),
            Some("sshd.service".to_string())
        );
    }

    #[test]
    fn test_apply_rewrites_to_capture() {
        let mut f = GroupFilter::default();
        f.set_normalize_regexp("^/app/(.+)$").unwrap();
        assert_eq!(f.apply("/app/web"), Some("web".to_string()));
        assert_eq!(f.apply("/app/db"), Some("db".to_string()));
        assert_eq!(f.apply("/other"), Some("/other".to_string()));
    }

    #[test]
    fn test_exclude_wins_over_normalize() {
        let mut f = GroupFilter::default();
        f.set_normalize_regexp("^/app/(.+)$").unwrap();
        f.set_exclude_regexp("^/app/db").unwrap();
        assert_eq!(f.apply("/app/db"), None);
        assert_eq!(f.apply("/app/web"), Some("web".to_string()));
    }

    #[test]
    fn test_empty_names_are_dropped() {
        let f = GroupFilter::default();
        assert_eq!(f.apply(""), None);

        let mut f = GroupFilter::default();
        f.set_normalize_regexp("^/app/(.*)$").unwrap();
        assert_eq!(f.apply("/app/"), None);
    }

    #[test]
    fn test_empty_pattern_clears_rule() {
        let mut f = GroupFilter::default();
        f.set_exclude_regexp("web").unwrap();
        f.set_exclude_regexp("").unwrap();
        assert_eq!(f.apply("/app/web"), Some("/app/web".to_string()));
    }
}
