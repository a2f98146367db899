// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic filtering for recording.
//!
//! Patterns support a single `*` wildcard anywhere in the pattern, or `*`
//! at both ends for a substring match.

use std::collections::BTreeSet;

/// Filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterMode {
    /// Keep only names matching a pattern.
    Include,
    /// Keep everything except names matching a pattern.
    Exclude,
}

/// Topic name filter.
#[derive(Debug, Clone)]
pub struct TopicFilter {
    mode: FilterMode,
    patterns: BTreeSet<String>,
}

impl TopicFilter {
    /// Record only matching topics. An include filter without patterns
    /// matches nothing.
    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: FilterMode::Include,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Record every topic except the matching ones.
    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: FilterMode::Exclude,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add(&mut self, pattern: impl Into<String>) {
        self.patterns.insert(pattern.into());
    }

    pub fn matches(&self, topic: &str) -> bool {
        apply(self.mode, &self.patterns, topic)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    pub fn is_include(&self) -> bool {
        self.mode == FilterMode::Include
    }
}

fn apply(mode: FilterMode, patterns: &BTreeSet<String>, name: &str) -> bool {
    let hit = patterns.iter().any(|p| pattern_match(p, name));
    match mode {
        FilterMode::Include => hit,
        FilterMode::Exclude => !hit,
    }
}

/// Wildcard match of `name` against `pattern`.
pub fn pattern_match(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == name;
    }

    if pattern.len() >= 2 && pattern.starts_with('*') && pattern.ends_with('*') {
        return name.contains(&pattern[1..pattern.len() - 1]);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }

    match pattern.split_once('*') {
        Some((head, tail)) if !tail.contains('*') => {
            name.len() >= head.len() + tail.len() && name.starts_with(head) && name.ends_with(tail)
        }
        _ => pattern == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_exact() {
        let filter = TopicFilter::include(["chatter", "pose"]);

        assert!(filter.matches("chatter"));
        assert!(filter.matches("pose"));
        assert!(!filter.matches("odom"));
    }

    #[test]
    fn test_exclude_exact() {
        let filter = TopicFilter::exclude(["debug"]);

        assert!(filter.matches("chatter"));
        assert!(!filter.matches("debug"));
    }

    #[test]
    fn test_wildcard_prefix_and_suffix() {
        let filter = TopicFilter::include(["sensors/*", "*/status"]);

        assert!(filter.matches("sensors/imu"));
        assert!(filter.matches("robot1/status"));
        assert!(!filter.matches("actuators/arm"));
        assert!(!filter.matches("status"));
    }

    #[test]
    fn test_wildcard_contains_and_all() {
        assert!(pattern_match("*cam*", "front_camera/raw"));
        assert!(!pattern_match("*cam*", "lidar"));
        assert!(pattern_match("*", ""));
        assert!(pattern_match("*", "anything"));
    }

    #[test]
    fn test_wildcard_middle_does_not_overlap() {
        assert!(pattern_match("rt/*/status", "rt/robot/status"));
        assert!(!pattern_match("rt/*/status", "rt/robot/cmd"));
        // Head and tail must not share characters.
        assert!(!pattern_match("ab*ba", "aba"));
    }

    #[test]
    fn test_add_pattern() {
        let mut filter = TopicFilter::include(Vec::<String>::new());
        assert!(!filter.matches("chatter"));

        filter.add("chat*");
        assert!(filter.matches("chatter"));
        assert_eq!(filter.patterns().collect::<Vec<_>>(), vec!["chat*"]);
        assert!(filter.is_include());
    }
}
