use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

type MetaLen = u32;
const META_LEN_SIZE: usize = size_of::<MetaLen>();

/// The only operation the pipeline RPC exposes.
pub const FORWARD_OP: &str = "forward";

/// One forward request as it travels a single hop.
///
/// The `input` bytes are an opaque, stage-specific tensor serialization: the
/// receiving stage knows the expected shape and dtype from its own static
/// configuration, never from the message itself.
#[derive(Debug)]
pub struct ForwardRequest<'a> {
    pub op: Cow<'a, str>,
    pub next: Cow<'a, str>,
    pub tag: Cow<'a, str>,
    pub input: &'a [u8],
}

impl<'a> ForwardRequest<'a> {
    /// Creates a `forward` request addressed to the `next` role, carrying the
    /// end-to-end correlation `tag` and the serialized tensor `input`.
    pub fn forward(next: &'a str, tag: &'a str, input: &'a [u8]) -> Self {
        Self {
            op: Cow::Borrowed(FORWARD_OP),
            next: Cow::Borrowed(next),
            tag: Cow::Borrowed(tag),
            input,
        }
    }
}

/// Borrowed JSON envelope written in front of the payload bytes of a call.
#[derive(serde::Serialize)]
struct CallMetaRef<'a> {
    op: &'a str,
    next: &'a str,
    tag: &'a str,
}

#[derive(serde::Deserialize)]
struct CallMeta<'a> {
    #[serde(borrow)]
    op: Cow<'a, str>,
    #[serde(borrow)]
    next: Cow<'a, str>,
    #[serde(borrow)]
    tag: Cow<'a, str>,
}

/// The application layer message for the entire system.
///
/// `Ack` carries no fields: it only confirms that the remote side accepted a
/// call. `Err` is the distinguishable protocol-level rejection.
#[derive(Debug)]
pub enum Msg<'a> {
    Err(Cow<'a, str>),
    Ack,
    Call(ForwardRequest<'a>),
}

impl Msg<'_> {
    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(byte: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind byte {byte}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                let header = (0 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                Some(e.as_bytes())
            }
            Msg::Ack => {
                let header = (1 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                None
            }
            Msg::Call(req) => {
                let header = (2 as Header).to_be_bytes();
                buf.extend_from_slice(&header);

                let meta_at = buf.len();
                buf.extend_from_slice(&[0; META_LEN_SIZE]);

                let meta = CallMetaRef {
                    op: &req.op,
                    next: &req.next,
                    tag: &req.tag,
                };

                // SAFETY: Serialize impl for `CallMetaRef` is derived and not
                //         implemented by hand. Nor has a non string-key map inside.
                serde_json::to_writer(&mut *buf, &meta).unwrap();

                let meta_len = (buf.len() - meta_at - META_LEN_SIZE) as MetaLen;
                buf[meta_at..meta_at + META_LEN_SIZE].copy_from_slice(&meta_len.to_be_bytes());

                Some(req.input)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            0 => {
                let string = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            1 => Ok(Self::Ack),
            2 => {
                if rest.len() < META_LEN_SIZE {
                    return Self::buf_is_too_small(buf.len());
                }

                let (len_buf, rest) = rest.split_at(META_LEN_SIZE);

                // SAFETY: Split to exactly `META_LEN_SIZE` just above.
                let meta_len = MetaLen::from_be_bytes(len_buf.try_into().unwrap()) as usize;

                if rest.len() < meta_len {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Call meta length {meta_len} exceeds frame body {}", rest.len()),
                    ));
                }

                let (meta_buf, input) = rest.split_at(meta_len);
                let meta: CallMeta = serde_json::from_slice(meta_buf)?;

                Ok(Self::Call(ForwardRequest {
                    op: meta.op,
                    next: meta.next,
                    tag: meta.tag,
                    input,
                }))
            }
            byte => Self::invalid_kind_byte(byte),
        }
    }
}
