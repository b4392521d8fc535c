use std::convert::Infallible;
use std::error::Error as StdError;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use http::{Method, Request, Uri};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};

use crate::error::Error;
use crate::headers::HeaderStore;
use crate::response::ResponseBody;
use crate::util::is_json_media_type;

type BoxBodyError = Box<dyn StdError + Send + Sync>;
pub(crate) type ReqBody = BoxBody<Bytes, BoxBodyError>;

/// Outgoing payload for one logical call. Buffered payloads replay across
/// retries, redirects and pagination hops; a stream can be sent exactly once.
pub(crate) enum OutgoingBody {
    Empty,
    Buffered(Bytes),
    Streaming(Option<ReqBody>),
}

impl OutgoingBody {
    pub(crate) fn is_replayable(&self) -> bool {
        !matches!(self, Self::Streaming(_))
    }

    /// Byte length to advertise as content-length, when the payload is
    /// buffered. Streams go out unframed by us (chunked by the transport).
    pub(crate) fn content_length(&self) -> Option<usize> {
        match self {
            Self::Buffered(bytes) => Some(bytes.len()),
            Self::Empty | Self::Streaming(_) => None,
        }
    }

    /// Wire body for the next physical exchange. Fails when an exchange
    /// already consumed the stream and a redirect asks to send it again.
    pub(crate) fn take_req_body(&mut self, method: &Method, url: &str) -> Result<ReqBody, Error> {
        match self {
            Self::Empty => Ok(empty_req_body()),
            Self::Buffered(bytes) => Ok(buffered_req_body(bytes.clone())),
            Self::Streaming(stream) => {
                stream
                    .take()
                    .ok_or_else(|| Error::RedirectBodyNotReplayable {
                        method: method.clone(),
                        url: url.to_owned(),
                    })
            }
        }
    }
}

fn map_infallible_to_box_error(never: Infallible) -> BoxBodyError {
    match never {}
}

pub(crate) fn empty_req_body() -> ReqBody {
    Full::new(Bytes::new())
        .map_err(map_infallible_to_box_error)
        .boxed()
}

pub(crate) fn buffered_req_body(body: Bytes) -> ReqBody {
    Full::new(body).map_err(map_infallible_to_box_error).boxed()
}

pub(crate) fn stream_req_body<S, E>(stream: S) -> ReqBody
where
    S: Stream<Item = Result<Bytes, E>> + Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
{
    BodyExt::boxed(StreamBody::new(stream.map(|item| {
        item.map(Frame::data)
            .map_err(|error| Box::new(error) as BoxBodyError)
    })))
}

pub(crate) fn build_http_request(
    method: Method,
    uri: Uri,
    headers: &HeaderStore,
    body: ReqBody,
) -> Result<Request<ReqBody>, Error> {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers.iter() {
        request_builder = request_builder.header(name, value);
    }
    request_builder
        .body(body)
        .map_err(|source| Error::RequestBuild { source })
}

pub(crate) async fn read_all_body(mut body: Incoming) -> Result<Bytes, hyper::Error> {
    let mut collected = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(data) = frame.data_ref() {
            collected.extend_from_slice(data);
        }
    }
    Ok(Bytes::from(collected))
}

/// Decode per declared content type: JSON media types parse strictly, all
/// other (or absent) types come back as lossy text.
pub(crate) fn decode_response_body(
    bytes: &Bytes,
    content_type: Option<&str>,
) -> Result<ResponseBody, serde_json::Error> {
    match content_type {
        Some(value) if is_json_media_type(value) => {
            serde_json::from_slice(bytes).map(ResponseBody::Json)
        }
        _ => Ok(ResponseBody::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
    }
}
