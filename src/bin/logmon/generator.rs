//! Synthetic access-log generator
//!
//! Writes one random Common Log Format line per interval, to a file
//! (appending) or to stdout, until Ctrl+C or the requested count.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use kuba_logmon::types::{LogEntry, Request};
use rand::Rng;
use tokio::io::AsyncWriteExt;

const HOSTS: &[&str] = &["127.0.0.1", "172.16.0.1", "10.0.0.7"];
const LOGNAMES: &[&str] = &["root@test.com", "user@test.com", "-"];
const USERS: &[&str] = &["alex", "george", "chris", "-"];
const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];
const URLS: &[&str] = &[
    "/user",
    "/user/subscriptions",
    "/analytics",
    "/analytics/reports",
];
const PROTOCOLS: &[&str] = &["HTTP/1.0", "HTTP/1.1", "HTTP/2.0"];
const STATUSES: &[u16] = &[200, 201, 202, 300, 301, 400, 401, 403, 404, 405, 500, 503];
const MAX_BYTES: u64 = 5000;

fn pick<'a, R: Rng>(rng: &mut R, values: &[&'a str]) -> &'a str {
    values[rng.random_range(0..values.len())]
}

/// Build one random entry stamped with the current time
pub fn random_entry() -> LogEntry {
    let mut rng = rand::rng();
    LogEntry {
        remote_host: pick(&mut rng, HOSTS).to_string(),
        remote_logname: pick(&mut rng, LOGNAMES).to_string(),
        auth_user: pick(&mut rng, USERS).to_string(),
        timestamp: Some(Utc::now()),
        request: Request::new(
            pick(&mut rng, METHODS),
            pick(&mut rng, URLS),
            pick(&mut rng, PROTOCOLS),
        ),
        status: STATUSES[rng.random_range(0..STATUSES.len())],
        bytes: rng.random_range(0..MAX_BYTES),
    }
}

/// Emit lines until interrupted or `count` lines were written
pub async fn run(
    output: Option<&Path>,
    interval: Duration,
    count: Option<u64>,
) -> std::io::Result<u64> {
    let mut file = match output {
        Some(path) => Some(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?,
        ),
        None => None,
    };

    let mut ticker = tokio::time::interval(interval);
    let mut written = 0u64;

    loop {
        if count.is_some_and(|limit| written >= limit) {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Generator interrupted");
                break;
            }
            _ = ticker.tick() => {
                let line = random_entry().to_string();
                match file.as_mut() {
                    Some(f) => {
                        f.write_all(line.as_bytes()).await?;
                        f.write_all(b"\n").await?;
                        f.flush().await?;
                    }
                    None => println!("{}", line),
                }
                written += 1;
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuba_logmon::AccessLogParser;

    #[test]
    fn test_generated_lines_parse() {
        let parser = AccessLogParser::new();
        for _ in 0..100 {
            let entry = random_entry();
            let parsed = parser.parse(&entry.to_string()).unwrap();
            assert_eq!(parsed.remote_host, entry.remote_host);
            assert_eq!(parsed.request, entry.request);
            assert_eq!(parsed.status, entry.status);
        }
    }

    #[tokio::test]
    async fn test_writes_requested_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");

        let written = run(Some(&path), Duration::from_millis(1), Some(5))
            .await
            .unwrap();
        assert_eq!(written, 5);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 5);
    }
}
