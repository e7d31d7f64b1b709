//! Represents a single blob (object) returned by a container listing.

use std::{collections::BTreeMap, fmt, path::PathBuf};
use thiserror::Error;
use url::Url;

/// Property keys the listing reports for most blobs.
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_MD5: &str = "Content-MD5";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("object name is empty")]
    EmptyName,
    #[error("object `{0}` has an empty url")]
    EmptyUrl(String),
    #[error("object `{name}` has invalid url `{url}`: {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },
}

/// A single remote object within a container.
///
/// Descriptors are built once per listing entry and never mutated. The
/// account and container are supplied by the caller because the listing
/// itself only reports them once, at the container level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Storage account the object belongs to.
    account: String,

    /// Container holding the object.
    container: String,

    /// Object key; may contain `/` separators.
    name: String,

    /// Fully-qualified download URL.
    url: Url,

    /// Provider metadata (size, content type, last modified, ...).
    properties: BTreeMap<String, String>,

    /// Path component of `url`, e.g. `/container/dir/file.txt`.
    local_path: String,

    /// Substring after the last `.` in `name`, or empty.
    extension: String,
}

impl ObjectDescriptor {
    /// Build a descriptor, validating that `name` and `url` are present and
    /// that `url` is an absolute http(s) URL.
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
        url: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if url.is_empty() {
            return Err(DescriptorError::EmptyUrl(name));
        }

        let parsed = Url::parse(url).map_err(|err| DescriptorError::InvalidUrl {
            name: name.clone(),
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DescriptorError::InvalidUrl {
                name,
                url: url.to_string(),
                reason: format!("unsupported scheme `{}`", parsed.scheme()),
            });
        }

        let local_path = parsed.path().to_string();
        let extension = extension_of(&name).to_string();

        Ok(Self {
            account: account.into(),
            container: container.into(),
            name,
            url: parsed,
            properties,
            local_path,
            extension,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Path component of the download URL, still percent-encoded.
    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The URL path as a relative filesystem path.
    ///
    /// Empty segments are dropped; dot segments were already resolved when
    /// the URL was parsed, so the result never escapes its root.
    pub fn relative_path(&self) -> PathBuf {
        self.url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Label used in progress and error reporting: `account:/container/key`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.account, self.local_path)
    }

    /// Size in bytes as reported by the listing.
    pub fn content_length(&self) -> Option<u64> {
        self.property(CONTENT_LENGTH)?.trim().parse().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.property(CONTENT_TYPE)
    }

    /// Base64-encoded MD5 digest of the blob content, when the provider has one.
    pub fn content_md5(&self) -> Option<&str> {
        self.property(CONTENT_MD5)
    }
}

impl fmt::Display for ObjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn extension_of(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}
