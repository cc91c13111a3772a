use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Normalizes an absolute URL according to Sat-Harvest's link identity rules
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only HTTP and HTTPS
/// 3. Remove fragment (everything after #)
/// 4. Re-encode the query string canonically, keeping parameter order
///    (`%20` and `+` both become `+`, reserved characters are percent-encoded)
/// 5. Remove empty query string (trailing ?)
///
/// Host lowercasing and dot-segment removal come from the URL parser itself.
///
/// # Examples
///
/// ```
/// use sat_harvest::url::normalize_url;
///
/// let url = normalize_url("https://CATALOG.example/api/search?q=a%20b#top").unwrap();
/// assert_eq!(url.as_str(), "https://catalog.example/api/search?q=a+b");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

/// Resolves a link found in a page against the page URL and normalizes it
///
/// # Arguments
///
/// * `base` - URL of the page the link was found on
/// * `href` - Raw `href` attribute value, absolute or relative
///
/// # Returns
///
/// * `Ok(Url)` - The absolute, normalized link
/// * `Err(UrlError)` - The link is empty, malformed or not HTTP(S)
pub fn normalize_link(base: &Url, href: &str) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Parse("empty link".to_string()));
    }

    let url = base.join(href).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

fn canonicalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}
