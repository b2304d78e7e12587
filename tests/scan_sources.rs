// tests/scan_sources.rs
// Scanner behavior across a mixed source list: broken sources are skipped
// with a recorded reason while the rest of the scan proceeds. The healthy
// playlist is served from a one-shot local listener.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use sports_stream_resolver::matching::TargetMatcher;
use sports_stream_resolver::scan::{PlaylistSource, Scanner, SourceKind, SourceOrigin};

const PLAYLIST: &str = "#EXTM3U\n#EXTINF:-1 group-title=\"Sports\",ESPN HD\nhttp://host/live/u/p/1.ts\n";

async fn serve_once(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/x-mpegurl\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });
    format!("http://{addr}/list.m3u")
}

fn source(name: &str, url: String, kind: SourceKind) -> PlaylistSource {
    PlaylistSource {
        name: name.to_string(),
        url,
        kind,
        stream_count: 0,
        origin: SourceOrigin::External,
    }
}

#[tokio::test]
async fn broken_sources_are_skipped_with_reasons_and_scan_continues() {
    let good_url = serve_once(PLAYLIST).await;
    let sources = vec![
        // connection refused: nothing listens on port 1
        source(
            "Unreachable",
            "http://127.0.0.1:1/dead.m3u".to_string(),
            SourceKind::Direct,
        ),
        // panel URL with no extractable credentials
        source(
            "Credless Panel",
            "http://127.0.0.1:1/".to_string(),
            SourceKind::XtreamApi,
        ),
        source("Local", good_url, SourceKind::Direct),
    ];

    let scanner = Scanner::new(TargetMatcher::new(["ESPN"]), "test-agent").unwrap();
    let (candidates, report) = scanner.scan_all(&sources).await;

    assert_eq!(report.sources_scanned, 1);
    assert_eq!(report.sources_failed, 2);
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(skipped, vec!["Unreachable", "Credless Panel"]);
    assert!(report.skipped.iter().all(|s| !s.reason.is_empty()));

    // the healthy source still contributed its candidate
    assert_eq!(report.candidates, 1);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].target_name, "ESPN");
    assert_eq!(candidates[0].url, "http://host/live/u/p/1.ts");
}
