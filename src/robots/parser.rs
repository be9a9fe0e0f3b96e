//! Robots.txt parser implementation
//!
//! Tokenizing is done by the robotstxt crate; a parse handler keeps only what
//! discovery needs: the disallow rules of the groups that apply to our bot,
//! the first crawl delay of those groups, and every sitemap directive in the
//! file.

use robotstxt::{parse_robotstxt, RobotsParseHandler};
use std::collections::HashSet;
use url::Url;

use crate::url::normalize;

/// Rules extracted from a robots.txt file
///
/// Transient: recomputed on every job run and shared between the sitemap and
/// navigation phases of that run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRules {
    /// Disallow patterns in file order; may contain `*` wildcards and a
    /// trailing `$` anchor
    pub disallowed_paths: Vec<String>,

    /// Crawl delay in seconds
    pub crawl_delay: Option<f64>,

    /// Sitemap URLs declared anywhere in the file, deduplicated
    pub sitemap_urls: Vec<String>,
}

impl RobotsRules {
    /// Rules that allow everything (robots.txt absent)
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks a full URL (path plus query) against the disallow rules
    pub fn allows_url(&self, url: &Url) -> bool {
        match url.query() {
            Some(query) => is_path_allowed(&format!("{}?{}", url.path(), query), self),
            None => is_path_allowed(url.path(), self),
        }
    }
}

/// Parses robots.txt content for the given bot token
///
/// # Parsing Rules
///
/// - `#` starts a comment; blank lines are ignored
/// - Consecutive `User-agent:` lines form one group; the group is relevant if
///   any agent is `*` or contains `bot_token` (case-insensitive)
/// - `Disallow:` is collected only inside relevant groups; an empty value
///   allows everything and is skipped
/// - `Allow:` closes the agent lines of a group but is otherwise ignored
/// - The first valid `Crawl-delay:` greater than zero inside a relevant group
///   is kept
/// - `Sitemap:` is collected regardless of the current group; malformed or
///   non-http(s) URLs are skipped
///
/// # Example
///
/// ```
/// use skeleton_discovery::robots::{parse_robots, is_path_allowed};
///
/// let rules = parse_robots("User-agent: *\nDisallow: /admin/\n", "skeletonbot");
/// assert!(!is_path_allowed("/admin/users", &rules));
/// assert!(is_path_allowed("/about", &rules));
/// ```
pub fn parse_robots(content: &str, bot_token: &str) -> RobotsRules {
    let mut builder = RulesBuilder::new(bot_token);
    parse_robotstxt(content, &mut builder);
    builder.rules
}

/// Parse callback accumulating [`RobotsRules`]
struct RulesBuilder {
    token: String,
    rules: RobotsRules,
    seen_sitemaps: HashSet<String>,
    /// True while reading consecutive User-agent lines of one group
    in_agent_lines: bool,
    group_relevant: bool,
}

impl RulesBuilder {
    fn new(bot_token: &str) -> Self {
        Self {
            token: bot_token.to_lowercase(),
            rules: RobotsRules::default(),
            seen_sitemaps: HashSet::new(),
            in_agent_lines: false,
            group_relevant: false,
        }
    }

    fn crawl_delay(&mut self, value: &str) {
        if !self.group_relevant || self.rules.crawl_delay.is_some() {
            return;
        }
        if let Ok(delay) = value.trim().parse::<f64>() {
            if delay.is_finite() && delay > 0.0 {
                self.rules.crawl_delay = Some(delay);
            }
        }
    }
}

impl RobotsParseHandler for RulesBuilder {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        if !self.in_agent_lines {
            self.group_relevant = false;
        }
        self.in_agent_lines = true;

        let agent = user_agent.trim().to_lowercase();
        if agent == "*" || (!self.token.is_empty() && agent.contains(&self.token)) {
            self.group_relevant = true;
        }
    }

    fn handle_allow(&mut self, _line_num: u32, _value: &str) {
        self.in_agent_lines = false;
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        self.in_agent_lines = false;
        let value = value.trim();
        if self.group_relevant && !value.is_empty() {
            self.rules.disallowed_paths.push(value.to_string());
        }
    }

    fn handle_sitemap(&mut self, _line_num: u32, value: &str) {
        let value = value.trim();
        match Url::parse(value) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                let url = url.to_string();
                if self.seen_sitemaps.insert(normalize(&url)) {
                    self.rules.sitemap_urls.push(url);
                }
            }
            _ => {
                tracing::debug!("Skipping malformed sitemap directive: {}", value);
            }
        }
    }

    fn handle_unknown_action(&mut self, _line_num: u32, action: &str, value: &str) {
        self.in_agent_lines = false;
        if action.trim().eq_ignore_ascii_case("crawl-delay") {
            self.crawl_delay(value);
        }
    }
}

/// Returns true if no disallow rule matches the path
///
/// Rules match as prefixes of the path. `*` matches any sequence of
/// characters and a trailing `$` anchors the rule to the end of the path.
pub fn is_path_allowed(path: &str, rules: &RobotsRules) -> bool {
    !rules
        .disallowed_paths
        .iter()
        .any(|rule| rule_matches(rule, path))
}

fn rule_matches(rule: &str, path: &str) -> bool {
    let (pattern, anchored) = match rule.strip_suffix('$') {
        Some(pattern) => (pattern, true),
        None => (rule, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    if !path.starts_with(first) {
        return false;
    }

    let mut pos = first.len();
    if parts.len() == 1 {
        return !anchored || pos == path.len();
    }

    let last = parts.len() - 1;
    for (idx, part) in parts.iter().enumerate().skip(1) {
        if idx == last && anchored {
            return path[pos..].ends_with(part);
        }
        match path[pos..].find(part) {
            Some(offset) => pos += offset + part.len(),
            None => return false,
        }
    }

    true
}
