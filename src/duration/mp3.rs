// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Incremental MPEG audio frame walker.
//!
//! Only frame headers are inspected. Frame bodies are skipped without being
//! buffered, so memory use stays constant however long the stream is.

use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::error::DecodeError;

/// Consecutive bytes without a valid frame header before decoding gives up
pub const MAX_RESYNC_BYTES: usize = 64 * 1024;

const HEADER_LEN: usize = 4;
const ID3V2_HEADER_LEN: usize = 10;

/// Kilobits per second, indexed by the 4-bit bitrate field. 0 is "free", 15 is invalid.
const BITRATES_V1_L1: [u32; 16] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0];
const BITRATES_V1_L2: [u32; 16] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0];
const BITRATES_V1_L3: [u32; 16] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0];
const BITRATES_V2_L1: [u32; 16] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0];
const BITRATES_V2_L23: [u32; 16] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0];

const SAMPLE_RATES_V1: [u32; 3] = [44_100, 48_000, 32_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    One,
    Two,
    Three,
}

/// A decoded 4-byte MPEG audio frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    version: Version,
    layer: Layer,
    /// Bits per second
    bitrate: u32,
    /// Hertz
    sample_rate: u32,
    padding: bool,
}

impl FrameHeader {
    /// Decode a header, returning `None` for anything that is not a usable frame start
    pub fn parse(bytes: [u8; 4]) -> Option<Self> {
        if bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (bytes[1] >> 3) & 0b11 {
            0b00 => Version::Mpeg25,
            0b10 => Version::Mpeg2,
            0b11 => Version::Mpeg1,
            _ => return None,
        };

        let layer = match (bytes[1] >> 1) & 0b11 {
            0b01 => Layer::Three,
            0b10 => Layer::Two,
            0b11 => Layer::One,
            _ => return None,
        };

        let bitrate_index = usize::from(bytes[2] >> 4);
        let table = match (version, layer) {
            (Version::Mpeg1, Layer::One) => &BITRATES_V1_L1,
            (Version::Mpeg1, Layer::Two) => &BITRATES_V1_L2,
            (Version::Mpeg1, Layer::Three) => &BITRATES_V1_L3,
            (_, Layer::One) => &BITRATES_V2_L1,
            (_, _) => &BITRATES_V2_L23,
        };
        // Free-format frames carry no length, so they cannot be skipped
        let kbps = table[bitrate_index];
        if kbps == 0 {
            return None;
        }

        let rate_index = usize::from((bytes[2] >> 2) & 0b11);
        let base_rate = *SAMPLE_RATES_V1.get(rate_index)?;
        let sample_rate = match version {
            Version::Mpeg1 => base_rate,
            Version::Mpeg2 => base_rate / 2,
            Version::Mpeg25 => base_rate / 4,
        };

        Some(Self {
            version,
            layer,
            bitrate: kbps * 1000,
            sample_rate,
            padding: (bytes[2] >> 1) & 1 == 1,
        })
    }

    pub fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (Layer::One, _) => 384,
            (Layer::Two, _) => 1152,
            (Layer::Three, Version::Mpeg1) => 1152,
            (Layer::Three, _) => 576,
        }
    }

    /// Total frame size in bytes, header included
    pub fn frame_len(&self) -> usize {
        let padding = u32::from(self.padding);
        let len = match self.layer {
            Layer::One => (12 * self.bitrate / self.sample_rate + padding) * 4,
            _ => self.samples_per_frame() / 8 * self.bitrate / self.sample_rate + padding,
        };
        len as usize
    }

    /// Playback time of this frame in seconds
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.samples_per_frame()) / f64::from(self.sample_rate)
    }
}

/// Size of a leading ID3v2 tag, including header and optional footer
fn id3v2_len(header: &[u8]) -> Option<usize> {
    if header.len() < ID3V2_HEADER_LEN || &header[..3] != b"ID3" {
        return None;
    }
    // Tag size is a 28-bit "syncsafe" integer: 7 bits per byte
    let size = header[6..10]
        .iter()
        .try_fold(0usize, |acc, b| (b & 0x80 == 0).then(|| (acc << 7) | usize::from(*b)))?;
    let footer = if header[5] & 0x10 != 0 { ID3V2_HEADER_LEN } else { 0 };
    Some(ID3V2_HEADER_LEN + size + footer)
}

/// Streaming duration counter for MP3 data.
///
/// Feed chunks with [`push`](Self::push) in arrival order, then call
/// [`finish`](Self::finish). Not meant to be shared between readers.
#[derive(Debug, Default)]
pub struct Mp3DurationDecoder {
    buf: BytesMut,
    /// Bytes of the current frame body (or tag) still to discard
    skip: usize,
    /// Absolute stream position of `buf[0]`
    position: u64,
    tag_checked: bool,
    unsynced: usize,
    frames: u64,
    seconds: f64,
}

impl Mp3DurationDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames counted so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Consume the next chunk of the stream
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        let mut chunk = chunk;

        if self.skip > 0 {
            let n = self.skip.min(chunk.len());
            chunk = &chunk[n..];
            self.skip -= n;
            self.position += n as u64;
        }

        if chunk.is_empty() {
            return Ok(());
        }

        self.buf.extend_from_slice(chunk);
        self.scan(false)
    }

    /// Signal end of stream and return the summed playback time
    pub fn finish(mut self) -> Result<Duration, DecodeError> {
        self.scan(true)?;

        if self.frames == 0 {
            return Err(DecodeError::NoFrames);
        }
        Ok(Duration::from_secs_f64(self.seconds))
    }

    fn scan(&mut self, at_eof: bool) -> Result<(), DecodeError> {
        loop {
            if self.skip > 0 {
                let n = self.skip.min(self.buf.len());
                self.advance(n);
                self.skip -= n;
                if self.skip > 0 {
                    return Ok(());
                }
            }

            if !self.tag_checked {
                if self.buf.len() < ID3V2_HEADER_LEN && !at_eof {
                    return Ok(());
                }
                self.tag_checked = true;
                if let Some(len) = id3v2_len(&self.buf) {
                    tracing::trace!(len, "skipping ID3v2 tag");
                    self.skip = len;
                    continue;
                }
            }

            if self.buf.len() < HEADER_LEN {
                return Ok(());
            }

            let header = [self.buf[0], self.buf[1], self.buf[2], self.buf[3]];
            match FrameHeader::parse(header) {
                Some(frame) => {
                    self.frames += 1;
                    self.seconds += frame.duration_secs();
                    self.unsynced = 0;
                    self.skip = frame.frame_len();
                }
                None => {
                    self.advance(1);
                    self.unsynced += 1;
                    if self.unsynced > MAX_RESYNC_BYTES {
                        return Err(DecodeError::LostSync {
                            offset: self.position,
                            skipped: self.unsynced,
                        });
                    }
                }
            }
        }
    }

    fn advance(&mut self, n: usize) {
        self.buf.advance(n);
        self.position += n as u64;
    }
}
