use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Certificate, Client, Method, RequestBuilder, Response, StatusCode};
use sharefs_common::{
    path, sort_entries, Credentials, DirectoryEntry, EntryType, ENTRY_TYPE_HEADER, INFO_QUERY,
};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Verb};

/// Connection options beyond the server URL.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub credentials: Option<Credentials>,
    /// Extra PEM-encoded root certificate to trust.
    pub ca_pem: Option<Vec<u8>>,
    /// Skip server certificate verification.
    pub insecure: bool,
}

/// Remote counterpart of the server's operation handlers. Never retries.
#[derive(Debug, Clone)]
pub struct ShareClient {
    remote: Url,
    client: Client,
    credentials: Option<Credentials>,
}

impl ShareClient {
    pub fn new(remote: &Url, options: ClientOptions) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(pem) = &options.ca_pem {
            builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
        }
        if options.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(ShareClient {
            remote: remote.clone(),
            client: builder.build()?,
            credentials: options.credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Lists a directory. An empty directory yields an empty vector.
    pub async fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>, ClientError> {
        let response = self.send(Verb::List, Method::GET, path, false, None).await?;
        if entry_type(&response) == Some(EntryType::File) {
            return Err(ClientError::NotADirectory);
        }
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        let mut entries: Vec<DirectoryEntry> = serde_json::from_slice(&response.bytes().await?)?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    pub async fn info(&self, path: &str) -> Result<DirectoryEntry, ClientError> {
        let response = self.send(Verb::Info, Method::GET, path, true, None).await?;
        decode_entry(Verb::Info, response).await
    }

    /// Downloads a file. A zero-length file yields empty bytes.
    pub async fn read(&self, path: &str) -> Result<Bytes, ClientError> {
        let response = self.send(Verb::Read, Method::GET, path, false, None).await?;
        if entry_type(&response) == Some(EntryType::Directory) {
            return Err(ClientError::IsDirectory);
        }
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Bytes::new());
        }
        Ok(response.bytes().await?)
    }

    pub async fn create_directory(&self, path: &str) -> Result<DirectoryEntry, ClientError> {
        let response = self
            .send(Verb::CreateDirectory, Method::POST, path, false, None)
            .await?;
        decode_entry(Verb::CreateDirectory, response).await
    }

    /// Uploads `contents`, replacing any existing file.
    pub async fn write(
        &self,
        path: &str,
        contents: impl Into<Bytes>,
    ) -> Result<DirectoryEntry, ClientError> {
        let response = self
            .send(Verb::Write, Method::PUT, path, false, Some(contents.into()))
            .await?;
        decode_entry(Verb::Write, response).await
    }

    /// Removes a file or directory tree; returns the entry as it was.
    pub async fn delete(&self, path: &str) -> Result<DirectoryEntry, ClientError> {
        let response = self
            .send(Verb::Delete, Method::DELETE, path, false, None)
            .await?;
        decode_entry(Verb::Delete, response).await
    }

    /// Builds the request URL below the server URL's own path. Dot segments
    /// are resolved here since `Url` would otherwise collapse them silently.
    fn url_for(&self, path: &str, info: bool) -> Result<Url, ClientError> {
        let normalized = path::normalize(path);
        let segments = path::segments(&normalized).ok_or(ClientError::InvalidPath)?;

        let mut url = self.remote.clone();
        let prefix = self.remote.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}/{}", encode_path(&segments)));
        url.set_query(None);
        url.set_fragment(None);
        if info {
            url.query_pairs_mut().append_pair(INFO_QUERY, "1");
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some(credentials) => builder.header(AUTHORIZATION, credentials.to_header_value()),
            None => builder,
        }
    }

    /// Sends a request and turns any status other than 200/204 into an error.
    async fn send(
        &self,
        verb: Verb,
        method: Method,
        path: &str,
        info: bool,
        body: Option<Bytes>,
    ) -> Result<Response, ClientError> {
        let url = self.url_for(path, info)?;
        debug!(?verb, %method, %url, "sending request");

        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(body);
        }
        let response = builder.send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(response),
            status => Err(ClientError::from_status(verb, status)),
        }
    }
}

fn entry_type(response: &Response) -> Option<EntryType> {
    response
        .headers()
        .get(ENTRY_TYPE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(EntryType::from_marker)
}

async fn decode_entry(verb: Verb, response: Response) -> Result<DirectoryEntry, ClientError> {
    if response.status() != StatusCode::OK {
        return Err(ClientError::from_status(verb, response.status()));
    }
    Ok(serde_json::from_slice(&response.bytes().await?)?)
}

fn encode_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ShareClient {
        ShareClient::new(
            &Url::parse("http://localhost:8080").unwrap(),
            ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path(&[]), "");
        assert_eq!(encode_path(&["a b", "c#d.txt"]), "a%20b/c%23d.txt");
        assert_eq!(encode_path(&["100%"]), "100%25");
    }

    #[test]
    fn test_url_for_resolves_dot_segments() {
        let c = client();
        assert_eq!(
            c.url_for("/a/./b/../c.txt", false).unwrap().as_str(),
            "http://localhost:8080/a/c.txt"
        );
        assert_eq!(c.url_for("a/..", false).unwrap().as_str(), "http://localhost:8080/");
        assert!(matches!(c.url_for("../x", false), Err(ClientError::InvalidPath)));
        assert!(matches!(
            c.url_for("a\\..\\..\\x", true),
            Err(ClientError::InvalidPath)
        ));
    }

    #[test]
    fn test_url_for_keeps_server_prefix() {
        for base in ["https://host/share/", "https://host/share"] {
            let c = ShareClient::new(&Url::parse(base).unwrap(), ClientOptions::default()).unwrap();
            assert_eq!(
                c.url_for("/docs/a.txt", false).unwrap().as_str(),
                "https://host/share/docs/a.txt"
            );
            assert_eq!(
                c.url_for("/", true).unwrap().as_str(),
                "https://host/share/?info=1"
            );
        }
    }

    #[test]
    fn test_url_for_normalizes() {
        let c = client();
        assert_eq!(
            c.url_for("docs\\x.txt/", false).unwrap().as_str(),
            "http://localhost:8080/docs/x.txt"
        );
        assert_eq!(
            c.url_for("", true).unwrap().as_str(),
            "http://localhost:8080/?info=1"
        );
    }
}
