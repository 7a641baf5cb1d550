use std::convert::Infallible;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};

use crate::dispatcher::{BodyStream, DispatchBody};
use crate::error::{BoxError, HttpieError};

pub(crate) type ReqBody = UnsyncBoxBody<Bytes, BoxError>;

fn map_infallible_to_box_error(never: Infallible) -> BoxError {
    match never {}
}

pub(crate) fn buffered_req_body(body: Bytes) -> ReqBody {
    Full::new(body)
        .map_err(map_infallible_to_box_error)
        .boxed_unsync()
}

pub(crate) fn stream_req_body(stream: BodyStream) -> ReqBody {
    StreamBody::new(stream.map(|item| item.map(Frame::data))).boxed_unsync()
}

pub(crate) fn req_body(body: DispatchBody) -> ReqBody {
    match body {
        DispatchBody::Empty => buffered_req_body(Bytes::new()),
        DispatchBody::Buffered(bytes) => buffered_req_body(bytes),
        DispatchBody::Streaming(stream) => stream_req_body(stream),
    }
}

pub(crate) fn build_http_request(
    method: Method,
    uri: Uri,
    headers: &HeaderMap,
    body: ReqBody,
) -> Result<Request<ReqBody>, HttpieError> {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request_builder = request_builder.header(name, value);
    }
    request_builder
        .body(body)
        .map_err(|source| HttpieError::RequestBuild { source })
}

pub(crate) fn incoming_body_stream(body: Incoming) -> BodyStream {
    body.into_data_stream()
        .map(|chunk| chunk.map_err(BoxError::from))
        .boxed()
}
