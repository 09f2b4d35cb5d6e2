use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::Config;
use crate::error::SchoolDataError;
use crate::registry::SourceCandidate;

/// Transport boundary. Everything that touches the network goes through
/// this trait so the pipeline can run against a test double.
pub trait SourceClient: Send + Sync {
    /// Lightweight reachability check (HEAD). Advisory only; unreachability
    /// is sometimes transient.
    fn probe(&self, url: &str) -> bool;

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SchoolDataError>;

    fn get_text(&self, url: &str) -> Result<String, SchoolDataError>;
}

#[derive(Clone)]
pub struct HttpSourceClient {
    client: Client,
    probe_client: Client,
}

impl HttpSourceClient {
    pub fn new(config: &Config) -> Result<Self, SchoolDataError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("coschooldata/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SchoolDataError::Http(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(config.download_timeout)
            .build()
            .map_err(|err| SchoolDataError::Http(err.to_string()))?;
        let probe_client = Client::builder()
            .default_headers(headers)
            .timeout(config.probe_timeout)
            .build()
            .map_err(|err| SchoolDataError::Http(err.to_string()))?;

        Ok(Self {
            client,
            probe_client,
        })
    }
}

impl SourceClient for HttpSourceClient {
    fn probe(&self, url: &str) -> bool {
        match self.probe_client.head(url).send() {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SchoolDataError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SchoolDataError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(SchoolDataError::Unreachable {
                url: url.to_string(),
                message: format!("status {}", response.status().as_u16()),
            });
        }
        let bytes = response
            .bytes()
            .map_err(|err| SchoolDataError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Ok(bytes.to_vec())
    }

    fn get_text(&self, url: &str) -> Result<String, SchoolDataError> {
        let bytes = self.get_bytes(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Xlsx,
    Xls,
    Csv,
    Html,
    Unknown,
}

const XLSX_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const XLS_MAGIC: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];

/// Classify a payload by its leading bytes. The interesting case is a body
/// that is really an HTML error page delivered with a success status.
pub fn sniff_payload(bytes: &[u8]) -> PayloadFormat {
    if bytes.starts_with(&XLSX_MAGIC) {
        return PayloadFormat::Xlsx;
    }
    if bytes.starts_with(&XLS_MAGIC) {
        return PayloadFormat::Xls;
    }

    let head_len = bytes.len().min(1024);
    let head = String::from_utf8_lossy(&bytes[..head_len]).to_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    if head.starts_with("<!doctype")
        || head.contains("<html")
        || head.contains("<head")
        || head.contains("<body")
    {
        return PayloadFormat::Html;
    }

    if looks_delimited(head) {
        return PayloadFormat::Csv;
    }

    PayloadFormat::Unknown
}

fn looks_delimited(head: &str) -> bool {
    let first_line = head.lines().next().unwrap_or("");
    if first_line.is_empty() || first_line.contains('<') {
        return false;
    }
    let printable = first_line
        .chars()
        .all(|ch| !ch.is_control() || ch == '\t');
    printable && (first_line.contains(',') || first_line.contains('\t'))
}

/// Download one candidate and validate the payload before it reaches the
/// parser. Returns the bytes together with the sniffed format; the format
/// recorded on the candidate is only a hint since upstream links sometimes
/// lie about their extension.
pub fn download_table(
    client: &dyn SourceClient,
    candidate: &SourceCandidate,
    config: &Config,
) -> Result<(Vec<u8>, PayloadFormat), SchoolDataError> {
    let bytes = client.get_bytes(&candidate.url)?;

    if bytes.len() < config.min_payload_bytes {
        return Err(SchoolDataError::TooSmall {
            url: candidate.url.clone(),
            bytes: bytes.len(),
            floor: config.min_payload_bytes,
        });
    }

    match sniff_payload(&bytes) {
        PayloadFormat::Html => Err(SchoolDataError::InvalidFormat {
            url: candidate.url.clone(),
            detail: "body is an HTML document, not a data file".to_string(),
        }),
        PayloadFormat::Unknown => Err(SchoolDataError::InvalidFormat {
            url: candidate.url.clone(),
            detail: "unrecognized payload signature".to_string(),
        }),
        format => Ok((bytes, format)),
    }
}
