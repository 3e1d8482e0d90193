use std::pin::Pin;

use crate::error::Result;

/// A boxed async stream.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Lines of an open event stream, in arrival order, without line terminators.
///
/// An `Err` item means the stream broke; the reader stops at the first one.
pub type LineStream = BoxStream<'static, Result<String>>;
