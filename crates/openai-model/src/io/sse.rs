#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Reading the body failed midway.
    Body(String),
    InvalidPayload,
}

/// Where the raw bytes of the stream come from.
enum Body {
    Http(Response),
    #[cfg(test)]
    Replay(VecDeque<Bytes>),
}

impl Body {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Body::Http(resp) => {
                resp.chunk().await.map_err(|err| Error::Body(err.to_string()))
            }
            #[cfg(test)]
            Body::Replay(chunks) => Ok(chunks.pop_front()),
        }
    }
}

/// Reads server-sent events from a response body and yields the `data` of
/// each event.
///
/// Comment lines are skipped, `event`, `id` and `retry` fields are
/// accepted and ignored. A trailing block without the blank-line
/// terminator is discarded when the stream ends.
pub struct Sse {
    buf: Vec<u8>,
    body: Body,
    exhausted: bool,
}

impl Sse {
    #[inline]
    pub fn from_response(resp: Response) -> Self {
        Self::with_body(Body::Http(resp))
    }

    /// Replays `chunks` as if they arrived one by one.
    #[cfg(test)]
    pub fn replay<I: IntoIterator<Item = Bytes>>(chunks: I) -> Self {
        Self::with_body(Body::Replay(chunks.into_iter().collect()))
    }

    fn with_body(body: Body) -> Self {
        Self {
            buf: Vec::new(),
            body,
            exhausted: false,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Bytes are buffered as-is, a multi-byte character may be split
            // between two chunks.
            while let Some(block) = self.take_block() {
                if let Some(data) = parse_block(&block)? {
                    return Ok(Some(data));
                }
            }

            if self.exhausted {
                return Ok(None);
            }
            match self.body.next_chunk().await? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.exhausted = true,
            }
        }
    }

    fn take_block(&mut self) -> Option<Vec<u8>> {
        let (end, sep_len) = find_boundary(&self.buf)?;
        let block = self.buf[..end].to_vec();
        self.buf.drain(..end + sep_len);
        Some(block)
    }
}

fn find_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let find = |pat: &[u8]| buf.windows(pat.len()).position(|w| w == pat);
    match (find(b"\n\n"), find(b"\r\n\r\n")) {
        (Some(lf), Some(crlf)) if crlf < lf => Some((crlf, 4)),
        (Some(lf), _) => Some((lf, 2)),
        (None, Some(crlf)) => Some((crlf, 4)),
        (None, None) => None,
    }
}

// event = *( comment / field ) end-of-line
// field = 1*name-char [ colon [ space ] *any-char ] end-of-line
fn parse_block(block: &[u8]) -> Result<Option<String>, Error> {
    let text = str::from_utf8(block).map_err(|_| Error::InvalidPayload)?;
    let mut data: Option<String> = None;
    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => {
                let data = data.get_or_insert_default();
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            "event" | "id" | "retry" => {}
            _ => return Err(Error::InvalidPayload),
        }
    }
    Ok(data)
}
