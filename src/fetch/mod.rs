//! Remote object fetching with resume
//!
//! Downloads are staged as `<name>.partial` next to their destination so
//! an interrupted transfer can resume. Before transferring we ask the
//! server for the authoritative content length: a local partial that is
//! *larger* than that cannot be a valid prefix and is discarded; anything
//! smaller is resumed with a Range request.

pub mod sdk;

use crate::error::{BurrowError, BurrowResult};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to do with an existing partial download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePlan {
    /// No partial, or the partial is unusable; transfer from byte 0
    Restart,
    /// Partial is a valid prefix; transfer from this offset
    Resume(u64),
    /// Partial already holds every byte; no transfer needed
    Complete,
}

/// Decide how to continue a download given the local partial size and the
/// authoritative remote length
pub fn resume_plan(local_len: Option<u64>, total: u64) -> ResumePlan {
    match local_len {
        None | Some(0) => ResumePlan::Restart,
        Some(len) if len > total => ResumePlan::Restart,
        Some(len) if len == total => ResumePlan::Complete,
        Some(len) => ResumePlan::Resume(len),
    }
}

/// Derive a local filename from the last path segment of a URL
pub fn filename_from_url(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// HTTP fetcher with bounded retries
#[derive(Clone)]
pub struct Fetcher {
    agent: ureq::Agent,
    retries: u32,
}

impl Fetcher {
    /// Create a fetcher that retries transient failures `retries` times
    pub fn new(retries: u32) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            retries: retries.max(1),
        }
    }

    /// Ask the server for the object's content length
    ///
    /// `Ok(None)` when the server does not report one; 404 maps to the
    /// distinct `NoSuchObject` so callers can downgrade missing optional
    /// artifacts to warnings.
    fn content_length(&self, url: &str) -> BurrowResult<Option<u64>> {
        match self.agent.head(url).call() {
            Ok(resp) => Ok(resp
                .headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())),
            Err(ureq::Error::StatusCode(404)) => Err(BurrowError::NoSuchObject {
                url: url.to_string(),
            }),
            Err(e) => Err(BurrowError::FetchExhausted {
                url: url.to_string(),
                attempts: 1,
                reason: e.to_string(),
            }),
        }
    }

    /// Download `url` into `dest_dir`, resuming any partial transfer
    ///
    /// Returns the path of the completed file. The file appears at its
    /// final name only once every byte is present.
    pub fn fetch(&self, url: &str, dest_dir: &Path) -> BurrowResult<PathBuf> {
        std::fs::create_dir_all(dest_dir)
            .map_err(|e| BurrowError::io(format!("creating {}", dest_dir.display()), e))?;

        let name = filename_from_url(url);
        let final_path = dest_dir.join(&name);
        let partial_path = dest_dir.join(format!("{name}.partial"));

        if final_path.exists() {
            debug!("{} already downloaded", final_path.display());
            return Ok(final_path);
        }

        // The HEAD sits inside the loop so a transient failure of the
        // length probe is retried like any other transport error, and a
        // retried attempt re-reads the authoritative length.
        let mut last_err = None;
        for attempt in 1..=self.retries {
            let outcome = self
                .content_length(url)
                .and_then(|total| self.transfer(url, &partial_path, total));
            match outcome {
                Ok(()) => {
                    std::fs::rename(&partial_path, &final_path).map_err(|e| {
                        BurrowError::io(format!("finalizing {}", final_path.display()), e)
                    })?;
                    info!("Fetched {} -> {}", url, final_path.display());
                    return Ok(final_path);
                }
                Err(e @ BurrowError::NoSuchObject { .. }) => return Err(e),
                Err(e) => {
                    warn!("Fetch attempt {}/{} for {} failed: {}", attempt, self.retries, url, e);
                    last_err = Some(e);
                    if attempt < self.retries {
                        std::thread::sleep(Duration::from_secs(u64::from(attempt)));
                    }
                }
            }
        }

        let reason = match last_err {
            Some(BurrowError::FetchExhausted { reason, .. }) => reason,
            Some(e) => e.to_string(),
            None => String::new(),
        };
        Err(BurrowError::FetchExhausted {
            url: url.to_string(),
            attempts: self.retries,
            reason,
        })
    }

    /// One transfer attempt into the partial file
    fn transfer(&self, url: &str, partial: &Path, total: Option<u64>) -> BurrowResult<()> {
        let local_len = std::fs::metadata(partial).ok().map(|m| m.len());

        let plan = match total {
            Some(total) => resume_plan(local_len, total),
            // Length unknown: resuming cannot be validated
            None => ResumePlan::Restart,
        };

        let offset = match plan {
            ResumePlan::Complete => return Ok(()),
            ResumePlan::Restart => {
                if partial.exists() {
                    debug!("Discarding oversized partial {}", partial.display());
                    std::fs::remove_file(partial)
                        .map_err(|e| BurrowError::io("removing partial download", e))?;
                }
                0
            }
            ResumePlan::Resume(offset) => {
                debug!("Resuming {} from byte {}", url, offset);
                offset
            }
        };

        let mut request = self.agent.get(url);
        if offset > 0 {
            request = request.header("Range", &format!("bytes={offset}-"));
        }
        let mut response = match request.call() {
            Ok(resp) => resp,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(BurrowError::NoSuchObject {
                    url: url.to_string(),
                })
            }
            Err(e) => {
                return Err(BurrowError::FetchExhausted {
                    url: url.to_string(),
                    attempts: 1,
                    reason: e.to_string(),
                })
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(partial)
            .map_err(|e| BurrowError::io(format!("opening {}", partial.display()), e))?;

        // A server that ignores Range answers 200 with the full body
        if offset > 0 && response.status().as_u16() != 206 {
            debug!("Server ignored Range request, restarting {}", url);
            file.set_len(0)
                .map_err(|e| BurrowError::io("truncating partial download", e))?;
        }

        let mut reader = response.body_mut().as_reader();
        io::copy(&mut reader, &mut file)
            .map_err(|e| BurrowError::io(format!("writing {}", partial.display()), e))?;

        if let Some(total) = total {
            let got = file
                .metadata()
                .map_err(|e| BurrowError::io("checking download size", e))?
                .len();
            if got != total {
                return Err(BurrowError::FetchTruncated {
                    url: url.to_string(),
                    got,
                    want: total,
                });
            }
        }
        Ok(())
    }
}
