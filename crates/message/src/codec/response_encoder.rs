use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::serializer::encode_response;
use crate::protocol::{Response, SerializeError};

/// Writes responses in wire format, see [`serialize`](crate::serialize).
///
/// The body is written in full after the head, the encoder keeps no state
/// between responses.
#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Response> for ResponseEncoder {
    type Error = SerializeError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Response>::encode(self, &item, dst)
    }
}

impl Encoder<&Response> for ResponseEncoder {
    type Error = SerializeError;

    fn encode(&mut self, item: &Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        encode_response(item, dst);
        trace!(status = item.status_code(), encoded = dst.len() - start, "encoded response");
        Ok(())
    }
}
