use crate::document::DocumentKind;
use crate::UrlError;
use url::{Position, Url};

/// Scheme used when neither the link, the parent nor the chain provide one
pub const FALLBACK_SCHEME: &str = "https";

/// Schemes whose addresses carry a network location
const NETLOC_SCHEMES: &[&str] = &[
    "http", "https", "ftp", "ftps", "file", "ws", "wss", "sftp", "git", "svn",
];

/// Per chain options for resolving scheme-less links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPolicy {
    pub default_scheme: String,
    pub prefer_parent_scheme: bool,
    pub forced_scheme: Option<String>,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            default_scheme: FALLBACK_SCHEME.to_string(),
            prefer_parent_scheme: true,
            forced_scheme: None,
        }
    }
}

/// A link split into its generic components
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkParts {
    pub scheme: String,
    pub netloc: String,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl LinkParts {
    /// Splits a raw reference without validating it
    ///
    /// Only used for references that are not full URLs yet: scheme-less
    /// links, bare host names and filesystem paths.
    pub fn split(link: &str) -> Self {
        let mut parts = LinkParts::default();
        let mut rest = link;

        if let Some(colon) = rest.find(':') {
            let candidate = &rest[..colon];
            let valid = candidate
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic())
                && candidate
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if valid {
                parts.scheme = candidate.to_ascii_lowercase();
                rest = &rest[colon + 1..];
            }
        }

        if let Some((before, fragment)) = rest.split_once('#') {
            parts.fragment = Some(fragment.to_string());
            rest = before;
        }
        if let Some((before, query)) = rest.split_once('?') {
            parts.query = Some(query.to_string());
            rest = before;
        }

        if let Some(authority) = rest.strip_prefix("//") {
            match authority.find('/') {
                Some(slash) => {
                    parts.netloc = authority[..slash].to_string();
                    parts.path = authority[slash..].to_string();
                }
                None => parts.netloc = authority.to_string(),
            }
        } else {
            parts.path = rest.to_string();
        }
        parts
    }

    /// Components of a parsed URL
    pub fn from_url(url: &Url) -> Self {
        let netloc = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        Self {
            scheme: url.scheme().to_string(),
            netloc,
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
            fragment: url.fragment().map(str::to_string),
        }
    }

    fn is_hierarchical(&self) -> bool {
        self.scheme.is_empty() || NETLOC_SCHEMES.contains(&self.scheme.as_str())
    }
}

/// Resolves a link found in a document of kind `source` into a canonical
/// address
///
/// `parent` is the address the link was found at: the document path, or the
/// current address of a rendered session. URL addresses are returned in the
/// serialization of [`url::Url`], so equal locations compare equal.
///
/// # Examples
///
/// ```
/// use chainscrape::document::DocumentKind;
/// use chainscrape::url::normalize_link;
///
/// let (address, _) = normalize_link("example.com", DocumentKind::Url, None, None).unwrap();
/// assert_eq!(address, "https://example.com/");
///
/// let (address, _) =
///     normalize_link("img/x.png", DocumentKind::File, Some("dir/page.html"), None).unwrap();
/// assert_eq!(address, "dir/img/x.png");
/// ```
pub fn normalize_link(
    link: &str,
    source: DocumentKind,
    parent: Option<&str>,
    policy: Option<&LinkPolicy>,
) -> Result<(String, LinkParts), UrlError> {
    let link = link.trim();
    if link.is_empty() {
        return Err(UrlError::Malformed("empty link".to_string()));
    }
    let parts = LinkParts::split(link);

    if source == DocumentKind::ContentFile || !parts.is_hierarchical() {
        return Ok((link.to_string(), parts));
    }

    let parent = parent.filter(|p| !p.is_empty());

    if source.derived() == DocumentKind::File && parts.scheme.is_empty() {
        let joined = match parent {
            Some(base) if !link.starts_with('/') => {
                format!("{}{}", dirname(&LinkParts::split(base).path), link)
            }
            _ => link.to_string(),
        };
        let path = normpath(&joined);
        let parts = LinkParts::split(&path);
        return Ok((path, parts));
    }

    let base = parent
        .and_then(|p| Url::parse(p).ok())
        .filter(|u| !u.cannot_be_a_base());

    let url = if !parts.scheme.is_empty() {
        parse(link)?
    } else if let Some(authority) = link.strip_prefix("//") {
        let scheme = implied_scheme(base.as_ref(), policy);
        parse(&format!("{}://{}", scheme, authority))?
    } else if let Some(base) = &base {
        base.join(link)
            .map_err(|e| UrlError::Parse(format!("{} against {}: {}", link, base, e)))?
    } else if let Some(parent) = parent {
        return Err(UrlError::Malformed(format!(
            "cannot resolve {} against {}",
            link, parent
        )));
    } else if link.starts_with('.') || link.starts_with('/') {
        return Err(UrlError::Malformed(format!(
            "relative link without a parent address: {}",
            link
        )));
    } else {
        let scheme = implied_scheme(None, policy);
        parse(&format!("{}://{}", scheme, link))?
    };

    let url = match policy.and_then(|p| p.forced_scheme.as_deref()) {
        Some(forced) if forced != url.scheme() => {
            parse(&format!("{}{}", forced, &url[Position::AfterScheme..]))?
        }
        _ => url,
    };

    let parts = LinkParts::from_url(&url);
    Ok((url.to_string(), parts))
}

fn parse(address: &str) -> Result<Url, UrlError> {
    Url::parse(address).map_err(|e| UrlError::Parse(format!("{}: {}", address, e)))
}

/// Scheme for a link that names none, from the parent or the chain policy
fn implied_scheme(base: Option<&Url>, policy: Option<&LinkPolicy>) -> String {
    let parent_scheme = base.map(Url::scheme).filter(|s| *s != "file");
    match (policy, parent_scheme) {
        (Some(p), Some(s)) if p.prefer_parent_scheme => s.to_string(),
        (Some(p), _) => p.default_scheme.clone(),
        (None, _) => FALLBACK_SCHEME.to_string(),
    }
}

/// Directory part of a path including the trailing slash, empty for bare
/// names
fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

/// Lexically normalizes a filesystem path
///
/// Collapses repeated separators and `.` segments and resolves `..` against
/// the preceding segment. Leading `..` segments of relative paths are kept.
pub fn normpath(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => match segments.last().copied() {
                Some(last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
