//! Range-honoring mock responder shared by transfer and pipeline tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::{Request, Respond, ResponseTemplate};

/// Serves `body` honoring `Range` headers
///
/// The first `fail_parts` part requests answer 503; the two-byte length
/// probe is never failed. Requests without a `Range` header get the whole
/// body with status 200.
pub(crate) struct RangeResponder {
    body: Arc<Vec<u8>>,
    fail_parts: Arc<AtomicUsize>,
    /// Part requests seen so far, failed ones included
    pub(crate) part_requests: Arc<AtomicUsize>,
}

impl RangeResponder {
    pub(crate) fn new(body: Vec<u8>, fail_parts: usize) -> Self {
        Self {
            body: Arc::new(body),
            fail_parts: Arc::new(AtomicUsize::new(fail_parts)),
            part_requests: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let Some(range) = range else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.as_slice().to_vec());
        };

        let spec = range.trim_start_matches("bytes=");
        let (start, end) = spec.split_once('-').unwrap();
        let start: usize = start.parse().unwrap();
        let end: usize = end.parse::<usize>().unwrap().min(self.body.len() - 1);

        if range != "bytes=0-1" {
            self.part_requests.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .fail_parts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failed {
                return ResponseTemplate::new(503);
            }
        }

        ResponseTemplate::new(206)
            .insert_header(
                "Content-Range",
                format!("bytes {}-{}/{}", start, end, self.body.len()).as_str(),
            )
            .set_body_bytes(self.body[start..=end].to_vec())
    }
}
