//! Type-erased request/response messages.
//!
//! Any `serde` type is a message. The registry only sees
//! `dyn DynMessage`: it can fill one from bytes, serialize it back, and
//! hand it to a service, which downcasts to its concrete type.

use std::any::Any;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Concrete message types usable with `ServiceBuilder` and `RpcClient::call`.
pub trait Message: Serialize + DeserializeOwned + Default + Send + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Default + Send + 'static {}

/// Object-safe view of a message.
pub trait DynMessage: Send {
    /// Replace `self` with the message decoded from `bytes`.
    fn merge_from_bytes(&mut self, bytes: &[u8]) -> Result<(), postcard::Error>;

    fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> DynMessage for T
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn merge_from_bytes(&mut self, bytes: &[u8]) -> Result<(), postcard::Error> {
        *self = postcard::from_bytes(bytes)?;
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn encode_message<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_allocvec(msg)
}

pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, postcard::Error> {
    postcard::from_bytes(bytes)
}

/// Fresh default-valued message behind the trait object.
pub(crate) fn new_boxed<T: Message>() -> Box<dyn DynMessage> {
    Box::new(T::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sentence {
        text: String,
    }

    #[test]
    fn test_dyn_message_fill_and_downcast() {
        let bytes = encode_message(&Sentence { text: "hi".into() }).unwrap();
        let mut boxed = new_boxed::<Sentence>();
        boxed.merge_from_bytes(&bytes).unwrap();
        assert_eq!(
            boxed.as_any().downcast_ref::<Sentence>(),
            Some(&Sentence { text: "hi".into() })
        );
        assert_eq!(boxed.to_bytes().unwrap(), bytes);
        assert!(boxed.as_any().downcast_ref::<u32>().is_none());
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let mut boxed = new_boxed::<Sentence>();
        // Length prefix claims 5 bytes of text, only 1 present.
        assert!(boxed.merge_from_bytes(&[5, b'a']).is_err());
        let decoded: Result<Sentence, _> = decode_message(&[]);
        assert!(decoded.is_err());
    }
}
