use url::Url;
use uuid::Uuid;

/// Convenience wrapper for URL generation functions.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path under which every API route is mounted.
    pub(crate) api_path: String,

    /// Prefix for all API URLs.
    api_prefix: String,
}

impl Urls {
    /// Create a new instance. `api_path` should *not* include a trailing slash.
    pub fn new(base: impl AsRef<str>, api_path: impl Into<String>) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));
        let api_path = api_path.into();
        let api_prefix = format!("{}/", api_path);

        Urls {
            base,
            api_path,
            api_prefix,
        }
    }

    pub fn api(&self) -> Url {
        self.base.join(&self.api_prefix).expect("get API URL")
    }

    pub fn video(&self, id: &Uuid) -> Url {
        self.resource("videos", id)
    }

    pub fn annotation(&self, id: &Uuid) -> Url {
        self.resource("annotations", id)
    }

    pub fn voice_script(&self, id: &Uuid) -> Url {
        self.resource("voice-scripts", id)
    }

    fn resource(&self, collection: &str, id: &Uuid) -> Url {
        let path = format!("{}/{}", collection, id);
        self.api()
            .join(&path)
            .unwrap_or_else(|_| panic!("get URL for {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_live_under_the_api_path() {
        let urls = Urls::new("https://example.com/", "api/v1");
        let id = Uuid::nil();

        assert_eq!(urls.api().as_str(), "https://example.com/api/v1/");
        assert_eq!(
            urls.voice_script(&id).as_str(),
            "https://example.com/api/v1/voice-scripts/00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            urls.video(&id).as_str(),
            "https://example.com/api/v1/videos/00000000-0000-0000-0000-000000000000"
        );
    }
}
