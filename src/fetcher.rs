use async_trait::async_trait;
use image::ImageFormat;
use reqwest::header::{ ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT };
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::config::ScrapeConfig;
use crate::error::FetchError;
use crate::user_agents;

/// Source of search-result pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError>;
}

/// Source of image bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

/// Downloaded image bytes with their sniffed format.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl FetchedImage {
    /// Sniffs the format from the leading bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FetchError> {
        let format = image::guess_format(&bytes).map_err(|_| FetchError::NotAnImage)?;
        Ok(FetchedImage { bytes, format })
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

/// A struct responsible for fetching HTTP content.
pub struct Fetcher {
    client: Client,
    lang: String,
    max_image_bytes: usize,
}

impl Fetcher {
    /// Creates a new `Fetcher` with the given configurations.
    pub fn new(
        timeout: Duration,
        ssl_verify: bool,
        proxy: Option<String>
    ) -> Result<Self, FetchError> {
        let client_builder = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .danger_accept_invalid_certs(!ssl_verify);

        let client_builder = if let Some(proxy_url) = proxy {
            client_builder.proxy(reqwest::Proxy::all(proxy_url)?)
        } else {
            client_builder
        };

        let client = client_builder.build()?;

        Ok(Fetcher {
            client,
            lang: "en".to_string(),
            max_image_bytes: usize::MAX,
        })
    }

    pub fn from_config(config: &ScrapeConfig) -> Result<Self, FetchError> {
        let mut fetcher = Fetcher::new(
            config.request_timeout,
            config.ssl_verify,
            config.proxy.clone()
        )?;
        fetcher.lang = config.lang.clone();
        fetcher.max_image_bytes = config.max_image_bytes;
        Ok(fetcher)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header(USER_AGENT, user_agents::get_useragent())
            .header(ACCEPT, user_agents::ACCEPT)
            .header(ACCEPT_LANGUAGE, user_agents::accept_language(&self.lang))
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let response = self.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ImageSource for Fetcher {
    /// Fetches one image, rejecting error pages and oversized bodies.
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let url = Url::parse(url)?;
        let mut response = self.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("image") && !content_type.contains("octet-stream") {
            return Err(FetchError::ContentType(content_type));
        }

        let limit = self.max_image_bytes;
        if response.content_length().is_some_and(|len| len > (limit as u64)) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        FetchedImage::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{ header_exists, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn fetcher(limit: usize) -> Fetcher {
        let config = ScrapeConfig::builder()
            .request_timeout(Duration::from_secs(5))
            .max_image_bytes(limit)
            .build();
        Fetcher::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_image_sniffs_format() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/panda.png"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(PNG_MAGIC)
            )
            .mount(&server).await;

        let image = fetcher(1024)
            .fetch_image(&format!("{}/panda.png", server.uri())).await
            .unwrap();

        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(image.extension(), "png");
    }

    #[tokio::test]
    async fn test_fetch_image_rejects_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html>blocked</html>",
                    "text/html; charset=utf-8"
                )
            )
            .mount(&server).await;

        let err = fetcher(1024)
            .fetch_image(&format!("{}/x.jpg", server.uri())).await
            .unwrap_err();

        assert!(matches!(err, FetchError::ContentType(ct) if ct.starts_with("text/html")));
    }

    #[tokio::test]
    async fn test_fetch_image_status_and_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"definitely not pixels".to_vec())
            )
            .mount(&server).await;

        let fetcher = fetcher(1024);
        let gone = fetcher.fetch_image(&format!("{}/gone.jpg", server.uri())).await;
        let blob = fetcher.fetch_image(&format!("{}/blob", server.uri())).await;

        assert!(matches!(gone, Err(FetchError::Status(404))));
        assert!(matches!(blob, Err(FetchError::NotAnImage)));
    }

    #[tokio::test]
    async fn test_fetch_image_enforces_size_limit() {
        let server = MockServer::start().await;
        let mut body = PNG_MAGIC.to_vec();
        body.resize(4096, 0);
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(body)
            )
            .mount(&server).await;

        let err = fetcher(1024)
            .fetch_image(&format!("{}/big.png", server.uri())).await
            .unwrap_err();

        assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_fetch_image_invalid_url() {
        let err = fetcher(1024).fetch_image("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
