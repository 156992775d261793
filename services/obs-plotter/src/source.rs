//! Observation sources.
//!
//! A source answers one [`FetchRequest`] with the raw rows of one subtype for
//! one date. Every implementation makes a single bounded attempt; the caller
//! decides what a failure means.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use observations::{ObservationSourceKind, ProcessingDate, RawRecord, TimeOfDay};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("observation store returned status {0}")]
    Status(u16),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed observation payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A request for one subtype over the rest of one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRequest {
    pub contact: String,
    pub subtype: String,
    pub keywords: Vec<String>,
    pub elements: Vec<String>,
    #[serde(skip)]
    pub kind: ObservationSourceKind,
    #[serde(skip)]
    pub date: ProcessingDate,
    #[serde(skip)]
    pub start: TimeOfDay,
}

impl FetchRequest {
    pub fn new(
        kind: ObservationSourceKind,
        date: ProcessingDate,
        start: TimeOfDay,
        contact: &str,
        platform: &str,
    ) -> Self {
        Self {
            contact: contact.to_string(),
            subtype: kind.subtype().to_string(),
            keywords: vec![
                format!("START TIME {}/{}Z", date, start),
                format!("END TIME {}/{}Z", date, TimeOfDay::LAST_MAP),
                format!("PLATFORM {}", platform),
            ],
            elements: kind.elements().iter().map(|e| e.to_string()).collect(),
            kind,
            date,
            start,
        }
    }
}

/// Something that can answer observation requests.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError>;
}

/// Reads JSON extracts from a directory.
///
/// Each file `<SUBTYPE>_<YYYYMMDD>.json` holds an array of rows, `null`
/// marking a masked value. Rows before the requested start are left out.
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, request: &FetchRequest) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", request.subtype, request.date))
    }
}

#[async_trait]
impl ObservationSource for FileSource {
    #[instrument(skip(self, request), fields(subtype = %request.subtype, date = %request.date))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError> {
        let path = self.path_for(request);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;

        let rows: Vec<RawRecord> = serde_json::from_str(&content)?;
        let total = rows.len();
        let rows: Vec<RawRecord> = rows
            .into_iter()
            .filter(|row| at_or_after(request, row))
            .collect();

        debug!(path = %path.display(), total, kept = rows.len(), "Read observation extract");
        Ok(rows)
    }
}

/// Undecodable rows are kept so the caller can count them.
fn at_or_after(request: &FetchRequest, row: &[Option<f64>]) -> bool {
    match request.kind.decode(row) {
        Ok(record) => {
            let key = record.timestamp_key();
            !key.is_on(&request.date) || key.time_of_day() >= request.start
        }
        Err(_) => true,
    }
}

/// Posts requests as JSON to an observation store endpoint.
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ObservationSource for HttpSource {
    #[instrument(skip(self, request), fields(url = %self.url, subtype = %request.subtype))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError> {
        debug!(keywords = ?request.keywords, "Requesting observations");

        let response = self.client.post(&self.url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        let rows: Vec<RawRecord> = serde_json::from_str(&body)?;

        info!(rows = rows.len(), "Fetched observations");
        Ok(rows)
    }
}

/// Build the source described by the run configuration.
pub fn from_config(config: &crate::config::SourceConfig) -> Result<Box<dyn ObservationSource>, FetchError> {
    use crate::config::SourceConfig;

    Ok(match config {
        SourceConfig::File { dir } => Box::new(FileSource::new(dir.as_path())),
        SourceConfig::Http { url, timeout_secs } => {
            Box::new(HttpSource::new(url.clone(), Duration::from_secs(*timeout_secs))?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use test_utils::{dates, landsyn_row, srew_row, stations};

    fn request(kind: ObservationSourceKind, start: &str) -> FetchRequest {
        FetchRequest::new(
            kind,
            ProcessingDate::parse(dates::SUMMER_DAY).unwrap(),
            TimeOfDay::parse(start).unwrap(),
            "tester",
            "03",
        )
    }

    fn write_extract(dir: &Path, name: &str, rows: &[RawRecord]) {
        std::fs::write(dir.join(name), serde_json::to_string(rows).unwrap()).unwrap();
    }

    #[test]
    fn test_request_keywords() {
        let req = request(ObservationSourceKind::LandSynoptic, "1300");
        assert_eq!(req.subtype, "LNDSYN");
        assert_eq!(
            req.keywords,
            vec![
                "START TIME 20240601/1300Z",
                "END TIME 20240601/2300Z",
                "PLATFORM 03"
            ]
        );
        assert_eq!(req.elements.len(), 11);
        assert_eq!(req.elements[10], "HRZL_VSBLY");
    }

    #[test]
    fn test_request_serializes_wire_fields_only() {
        let req = request(ObservationSourceKind::RainGauge, "0000");
        let json = serde_json::to_value(&req).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(json["subtype"], "SREW");
    }

    #[tokio::test]
    async fn test_file_source_filters_by_start() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            srew_row(stations::LERWICK, (2024, 6, 1, 11), Some(0.2)),
            srew_row(stations::LERWICK, (2024, 6, 1, 12), Some(0.4)),
            srew_row(stations::LERWICK, (2024, 6, 1, 13), None),
        ];
        write_extract(dir.path(), "SREW_20240601.json", &rows);

        let source = FileSource::new(dir.path());
        let fetched = source
            .fetch(&request(ObservationSourceKind::RainGauge, "1200"))
            .await
            .unwrap();
        assert_eq!(fetched, rows[1..].to_vec());
    }

    #[tokio::test]
    async fn test_file_source_keeps_minute_reports() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            landsyn_row(stations::HEATHROW, (2024, 6, 1, 12, 50), Some(290.0), None, None),
            landsyn_row(stations::HEATHROW, (2024, 6, 1, 13, 0), Some(291.0), None, None),
        ];
        write_extract(dir.path(), "LNDSYN_20240601.json", &rows);

        let source = FileSource::new(dir.path());
        let fetched = source
            .fetch(&request(ObservationSourceKind::LandSynoptic, "1300"))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0][6], Some(13.0));
    }

    // ========================================================================
    // HTTP source against a local listener
    // ========================================================================

    /// Body of one HTTP request, read up to its `Content-Length`.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return String::new();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let start = end + 4;
                if buf.len() >= start + len {
                    return String::from_utf8_lossy(&buf[start..start + len]).into_owned();
                }
            }
        }
    }

    /// Answers every request with `status` and `body`, or never answers when
    /// `status` is `None`. Returns the URL and the request bodies received.
    async fn serve(status: Option<&'static str>, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/retrieve", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let seen = received.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                seen.lock().unwrap().push(request);
                let Some(status) = status else {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    continue;
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, received)
    }

    #[tokio::test]
    async fn test_http_source_parses_rows() {
        let (url, received) = serve(
            Some("200 OK"),
            "[[3772, 51.479, -0.449, 2024, 6, 1, 12, 0, 283.15, null, 20000]]",
        )
        .await;
        let source = HttpSource::new(url, Duration::from_secs(5)).unwrap();

        let rows = source
            .fetch(&request(ObservationSourceKind::LandSynoptic, "1200"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Some(3772.0));
        assert_eq!(rows[0][8], Some(283.15));
        assert_eq!(rows[0][9], None);

        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        let sent: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(sent["subtype"], "LNDSYN");
        assert_eq!(sent["contact"], "tester");
        assert_eq!(sent["keywords"][0], "START TIME 20240601/1200Z");
    }

    #[tokio::test]
    async fn test_http_source_error_status_single_attempt() {
        let (url, received) = serve(Some("503 Service Unavailable"), "busy").await;
        let source = HttpSource::new(url, Duration::from_secs(5)).unwrap();

        let result = source
            .fetch(&request(ObservationSourceKind::RainGauge, "0000"))
            .await;

        assert!(matches!(result, Err(FetchError::Status(503))));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_http_source_malformed_body() {
        let (url, received) = serve(Some("200 OK"), "{\"rows\": 3}").await;
        let source = HttpSource::new(url, Duration::from_secs(5)).unwrap();

        let result = source
            .fetch(&request(ObservationSourceKind::RainGauge, "0000"))
            .await;

        assert!(matches!(result, Err(FetchError::Decode(_))));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_http_source_times_out() {
        let (url, received) = serve(None, "").await;
        let source = HttpSource::new(url, Duration::from_millis(200)).unwrap();

        let result = source
            .fetch(&request(ObservationSourceKind::RainGauge, "0000"))
            .await;

        match result {
            Err(FetchError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        let req = request(ObservationSourceKind::RainGauge, "0000");

        assert!(matches!(source.fetch(&req).await, Err(FetchError::Io { .. })));

        std::fs::write(source.path_for(&req), "{ not json").unwrap();
        assert!(matches!(source.fetch(&req).await, Err(FetchError::Decode(_))));
    }
}
