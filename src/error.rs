// error.rs
//
// Copyright (c) 2026  Douglas Lau
//
use std::fmt;

/// Errors encountered while scanning or decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Ran out of source data before the stream was complete.  More data
    /// can be supplied and [data_scan](struct.Animation.html#method.data_scan)
    /// retried.
    InsufficientData,
    /// Ran out of source data inside a frame's image data.
    InsufficientFrameData,
    /// Frame data (extensions, descriptor or LZW stream) is corrupt.  Only
    /// the affected frame is lost; earlier frames remain decodable.
    FrameDataError,
    /// Stream-level corruption before any frame (bad signature, impossible
    /// logical screen descriptor, shrunken source window).
    DataError,
    /// A bitmap could not be allocated by the
    /// [BitmapClient](trait.BitmapClient.html).
    InsufficientMemory,
    /// The frame exists but cannot be displayed.
    FrameNoDisplay,
    /// End of frame data reached.
    EndOfFrame,
    /// Frame index is out of range.
    FrameInvalid,
    /// The animation has played through its loop count.  Call
    /// [reset](struct.Animation.html#method.reset) to play it again.
    AnimationComplete,
    /// More frames are expected; consumed internally by the survey loop and
    /// never returned from the public surface.
    Working,
}

/// Result type for scan / decode operations
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InsufficientData => write!(fmt, "insufficient data"),
            Error::InsufficientFrameData => {
                write!(fmt, "insufficient frame data")
            }
            Error::FrameDataError => write!(fmt, "frame data error"),
            Error::DataError => write!(fmt, "GIF data error"),
            Error::InsufficientMemory => write!(fmt, "out of memory"),
            Error::FrameNoDisplay => write!(fmt, "frame cannot be displayed"),
            Error::EndOfFrame => write!(fmt, "end of frame"),
            Error::FrameInvalid => write!(fmt, "invalid frame index"),
            Error::AnimationComplete => write!(fmt, "animation complete"),
            Error::Working => write!(fmt, "working"),
        }
    }
}

impl std::error::Error for Error {}
