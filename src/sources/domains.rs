//! Domain extraction and keyword filtering for certificate updates.

/// Domains shorter than this are never interesting.
pub const MIN_DOMAIN_LEN: usize = 4;

/// Candidate domains of one certificate: the subject CN followed by every
/// `DNS:` entry of the SAN string, lower-cased, duplicates collapsed.
///
/// A CN repeated as a SAN (the usual case) therefore yields one event, not
/// one per occurrence; the first position wins.
pub fn extract_domains(common_name: &str, subject_alt_name: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let domain = candidate.trim().to_lowercase();
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    };

    push(common_name);
    subject_alt_name
        .split(',')
        .map(str::trim)
        .filter_map(|part| part.strip_prefix("DNS:"))
        .for_each(&mut push);

    domains
}

/// Case-insensitive keyword matcher applied to candidate domains.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    // (as configured, lowercased)
    keywords: Vec<(String, String)>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.is_empty())
            .map(|k| {
                let lower = k.to_lowercase();
                (k, lower)
            })
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> Vec<&str> {
        self.keywords.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Keywords (as configured) contained in `domain`, or `None` when the
    /// domain is a wildcard, too short, or matches nothing.
    pub fn accept(&self, domain: &str) -> Option<Vec<String>> {
        if domain.starts_with("*.") || domain.chars().count() < MIN_DOMAIN_LEN {
            return None;
        }
        let domain = domain.to_lowercase();
        let matched: Vec<String> = self
            .keywords
            .iter()
            .filter(|(_, lower)| domain.contains(lower.as_str()))
            .map(|(original, _)| original.clone())
            .collect();
        (!matched.is_empty()).then_some(matched)
    }
}
