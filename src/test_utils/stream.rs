use std::marker::PhantomData;

use bytes::BufMut;
use bytes::BytesMut;
use futures::TryStreamExt;
use http_body::Frame;
use http_body_util::BodyExt;
use http_body_util::StreamBody;
use prost::Message;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::Code;
use tonic::Status;
use tonic::Streaming;

/// Generic gRPC stream decoder for any protobuf message
pub(crate) struct GrpcStreamDecoder<T> {
    _marker: PhantomData<T>,
}

impl<T> tonic::codec::Decoder for GrpcStreamDecoder<T>
where
    T: prost::Message + Default + 'static,
{
    type Item = T;
    type Error = Status;
    fn decode(
        &mut self,
        buf: &mut tonic::codec::DecodeBuf<'_>,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match T::decode(buf) {
            Ok(message) => Ok(Some(message)),
            Err(e) => Err(Status::new(Code::Internal, format!("Decode error: {e}"))),
        }
    }
}

/// Turns a channel into the `tonic::Streaming` a service method receives,
/// so streaming handlers can be called without a transport.
///
/// Every message goes through real gRPC framing and decoding.
pub(crate) fn request_stream<T>(
    rx: mpsc::Receiver<Result<T, Status>>,
    max_message_size: usize,
) -> Streaming<T>
where
    T: Message + Default + 'static,
{
    let byte_stream = ReceiverStream::new(rx).map(|res| {
        let message = res?;
        let buf = message.encode_to_vec();

        let mut frame = BytesMut::with_capacity(5 + buf.len());
        frame.put_u8(0); // No compression
        frame.put_u32(buf.len() as u32);
        frame.extend_from_slice(&buf);

        Ok::<_, Status>(frame.freeze())
    });

    let body = StreamBody::new(byte_stream.map_ok(Frame::data));

    Streaming::new_request(
        GrpcStreamDecoder::<T> { _marker: PhantomData },
        body.boxed_unsync(),
        None,
        Some(max_message_size),
    )
}
