//! Known bot user agents

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::DomainError;

/// User-agent fragments of crawlers, HTTP libraries and monitors
pub const DEFAULT_BOTS: &[(&str, &str)] = &[
    // Indexers
    ("AdsBot-Google", "Google Adwords"),
    ("Baidu", "Chinese search engine"),
    ("Gigabot", "Gigabot spider"),
    ("Googlebot", "Google spider"),
    ("msnbot", "Microsoft bot"),
    ("bingbot", "Microsoft bing bot"),
    ("rogerbot", "SeoMoz spider"),
    ("Slurp", "Yahoo spider"),
    ("Sogou", "Chinese search engine"),
    ("spider", "generic web spider"),
    ("WordPress", "WordPress spider"),
    ("ZIBB", "ZIBB spider"),
    ("YandexBot", "Yandex spider"),
    // HTTP libraries
    ("Apache-HttpClient", "Java http library"),
    ("AppEngine-Google", "Google App Engine"),
    ("curl", "curl unix CLI http client"),
    ("ColdFusion", "ColdFusion http library"),
    ("EventMachine HttpClient", "Ruby http library"),
    ("Go http package", "Go http library"),
    ("Java", "Generic Java http library"),
    ("libwww-perl", "Perl client-server library"),
    ("lwp-trivial", "Perl http library"),
    ("Python-urllib", "Python http library"),
    ("PycURL", "Python http library"),
    ("Test Certificate Info", "C http library"),
    ("Wget", "wget unix CLI http client"),
    // URL expanders and previewers
    ("awe.sm", "Awe.sm URL expander"),
    ("bitlybot", "bit.ly bot"),
    ("facebookexternalhit", "facebook bot"),
    ("LongURL", "URL expander service"),
    ("Twitterbot", "Twitter URL expander"),
    ("UnwindFetch", "Gnip URL expander"),
    // Uptime monitoring
    ("check_http", "Nagios monitor"),
    ("NewRelicPinger", "NewRelic monitor"),
    ("Panopta", "Monitoring service"),
    ("Pingdom", "Pingdom monitoring"),
    ("SiteUptime", "Site monitoring services"),
    // Misc
    ("DigitalPersona Fingerprint Software", "HP Fingerprint scanner"),
    ("ShowyouBot", "Showyou iOS app spider"),
    ("ZyBorg", "Zyborg spider"),
];

/// Robot regex over [`DEFAULT_BOTS`]
pub static DEFAULT_ROBOT_REGEX: Lazy<Regex> = Lazy::new(|| {
    build_robot_regex(DEFAULT_BOTS.iter().map(|(fragment, _)| *fragment)).unwrap()
});

/// Default bot table as an owned map
pub fn default_bots() -> BTreeMap<String, String> {
    DEFAULT_BOTS
        .iter()
        .map(|(fragment, description)| (fragment.to_string(), description.to_string()))
        .collect()
}

/// Build a case-insensitive robot regex
///
/// Matches any fragment on word boundaries, and also user agents made only
/// of non-word characters (including the empty one).
pub fn build_robot_regex<'a>(
    fragments: impl IntoIterator<Item = &'a str>,
) -> Result<Regex, DomainError> {
    let alternation = fragments
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");

    let pattern = if alternation.is_empty() {
        r"(?i)\A\W*\z".to_string()
    } else {
        format!(r"(?i)\b(?:{})\b|\A\W*\z", alternation)
    };

    Regex::new(&pattern)
        .map_err(|e| DomainError::configuration(format!("Invalid robot regex: {}", e)))
}
