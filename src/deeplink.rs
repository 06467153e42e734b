//! Focus deep links
//!
//! Desktop notifiers that cannot report clicks back to us (macOS
//! terminal-notifier, plain osascript) get a URI instead:
//!
//! `oscbell://<instance>/focus?tid=<token>`
//!
//! Activating it runs `oscbell focus <uri>`, which forwards the token to the
//! running instance's control socket.

use url::Url;

use crate::session::SessionToken;

pub const SCHEME: &str = "oscbell";

const FOCUS_PATH: &str = "/focus";
const TOKEN_PARAM: &str = "tid";

/// A parsed focus link
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FocusLink {
    /// Instance id of the oscbell process that minted the token
    pub instance: String,
    pub token: SessionToken,
}

/// Build the deep link for `token` minted by `instance`
pub fn focus_uri(instance: &str, token: &SessionToken) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{}://{}{}", SCHEME, instance, FOCUS_PATH))?;
    url.query_pairs_mut().append_pair(TOKEN_PARAM, token.as_str());
    Ok(url)
}

/// Parse a focus deep link. Anything that is not a well-formed focus link
/// yields `None`.
pub fn parse_focus_uri(uri: &str) -> Option<FocusLink> {
    let url = Url::parse(uri.trim()).ok()?;
    if url.scheme() != SCHEME || url.path() != FOCUS_PATH {
        return None;
    }

    let instance = url.host_str().filter(|h| !h.is_empty())?.to_string();
    let token = url
        .query_pairs()
        .find(|(key, _)| key == TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|t| !t.is_empty())?;

    Some(FocusLink {
        instance,
        token: SessionToken::from(token),
    })
}
