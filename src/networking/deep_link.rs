//! Invitation deep links (`lichess599://abcd1234`)

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeepLinkError {
    #[error("Not a link: {0}")]
    Invalid(String),

    #[error("Expected a `{expected}://` link, got `{found}://`")]
    WrongScheme { expected: String, found: String },

    #[error("Link `{0}` does not name a game")]
    MissingGameId(String),
}

/// Extract the game id from an invitation link.
///
/// The id is the trailing path segment, or the host when the link has no
/// path (`scheme://id`). Ids are alphanumeric.
pub fn parse_deep_link(link: &str, scheme: &str) -> Result<String, DeepLinkError> {
    let url = Url::parse(link.trim()).map_err(|_| DeepLinkError::Invalid(link.to_owned()))?;
    if url.scheme() != scheme {
        return Err(DeepLinkError::WrongScheme {
            expected: scheme.to_owned(),
            found: url.scheme().to_owned(),
        });
    }

    let from_path = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_owned);
    let id = from_path
        .or_else(|| url.host_str().map(str::to_owned))
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or_else(|| DeepLinkError::MissingGameId(link.to_owned()))?;

    Ok(id)
}
