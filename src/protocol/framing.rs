//! Frame codec for the vanilla wire format.
//!
//! A frame is `<varint length><payload>`, where the payload is optionally
//! zlib-compressed (prefixed with its uncompressed length once compression
//! is negotiated) and the whole stream is optionally AES/CFB8-encrypted.
//! Decode applies the stages in the order decrypt -> deframe -> decompress;
//! encode is the exact inverse.

use super::BUFFER_LIMIT;
use crate::protocol::{DecodeError, Decoder, Encoder};
use aes::{cipher::generic_array::GenericArray, Aes128};
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::Compression;
use std::{
    io::{Read, Write},
    slice,
};

/// Most traffic through the proxy is small serverbound packets,
/// so we favor speed over ratio when compressing.
const COMPRESSION_LEVEL: Compression = Compression::fast();

/// Key used for encryption. Doubles as the IV, per the vanilla protocol.
#[derive(Copy, Clone, Debug)]
pub struct EncryptionKey([u8; 16]);

impl EncryptionKey {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// Size in bytes at which a packet body is compressed rather
/// than sent with the "not compressed" marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompressionThreshold(usize);

impl CompressionThreshold {
    pub fn new(threshold: usize) -> Self {
        Self(threshold)
    }
}

/// Inbound half of the codec. Feed it raw socket bytes with
/// [`FrameDecoder::give_data`], then drain complete frames with
/// [`FrameDecoder::next_frame`].
pub struct FrameDecoder {
    /// Buffered incoming bytes, already decrypted.
    read_buffer: Vec<u8>,
    decryptor: Option<cfb8::Decryptor<Aes128>>,
    compression_enabled: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::new(),
            decryptor: None,
            compression_enabled: false,
        }
    }

    pub fn enable_compression(&mut self) {
        self.compression_enabled = true;
    }

    pub fn enable_encryption(&mut self, key: EncryptionKey) {
        assert!(
            self.decryptor.is_none(),
            "called enable_encryption() multiple times"
        );
        self.decryptor = Some(cfb8::Decryptor::new(&key.0.into(), &key.0.into()));
    }

    /// Gives data to the internal read buffer.
    ///
    /// `data` will be modified in-place and its contents
    /// after calling this function are unspecified.
    ///
    /// Call `next_frame` in a loop to drain decoded frames.
    pub fn give_data(&mut self, data: &mut [u8]) {
        if let Some(decryptor) = &mut self.decryptor {
            for byte in data.iter_mut() {
                let slice = slice::from_mut(byte);
                decryptor.decrypt_block_mut(GenericArray::from_mut_slice(slice));
            }
        }

        self.read_buffer.extend_from_slice(data);
    }

    /// Attempts to decode one frame payload.
    ///
    /// * If a complete frame is not yet buffered (including a partially
    ///   received length prefix), returns `Ok(None)`.
    /// * If a frame was read, returns `Ok(Some(payload))`. More frames
    ///   may be buffered.
    /// * If an error occurs, returns `Err(e)`, invalidating the stream.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        let mut decoder = Decoder::new(&self.read_buffer);
        let (length, prefix_size) = match decoder.read_var_int_with_size() {
            Ok(x) => x,
            // An incomplete length prefix means we wait for more bytes.
            Err(DecodeError::EndOfStream(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if length < 0 {
            return Err(DecodeError::NegativeLength);
        }
        let length = length as usize;
        if length > BUFFER_LIMIT {
            return Err(DecodeError::FrameTooLarge(length));
        }

        let frame = match decoder.consume_slice(length) {
            Ok(x) => x,
            Err(DecodeError::EndOfStream(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let payload = if self.compression_enabled {
            let mut decoder = Decoder::new(frame);
            let uncompressed_length = decoder.read_var_int()?;
            if uncompressed_length < 0 {
                return Err(DecodeError::NegativeLength);
            }
            if uncompressed_length == 0 {
                // Below-threshold frame, sent uncompressed.
                decoder.buffer().to_vec()
            } else {
                if uncompressed_length as usize > BUFFER_LIMIT {
                    return Err(DecodeError::FrameTooLarge(uncompressed_length as usize));
                }
                let mut buf = Vec::with_capacity(uncompressed_length as usize);
                flate2::read::ZlibDecoder::new(decoder.buffer())
                    .take(BUFFER_LIMIT as u64)
                    .read_to_end(&mut buf)?;
                buf
            }
        } else {
            frame.to_vec()
        };

        self.read_buffer.drain(..prefix_size + length);
        Ok(Some(payload))
    }
}

/// Outbound half of the codec. Turns a packet payload into the bytes
/// to put on the wire.
pub struct FrameEncoder {
    encryptor: Option<cfb8::Encryptor<Aes128>>,
    compression: Option<CompressionThreshold>,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            encryptor: None,
            compression: None,
        }
    }

    pub fn enable_compression(&mut self, threshold: CompressionThreshold) {
        self.compression = Some(threshold);
    }

    pub fn enable_encryption(&mut self, key: EncryptionKey) {
        assert!(
            self.encryptor.is_none(),
            "called enable_encryption() multiple times"
        );
        self.encryptor = Some(cfb8::Encryptor::new(&key.0.into(), &key.0.into()));
    }

    /// Encodes one packet payload into a wire frame.
    pub fn encode(&mut self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let uncompressed_length = i32::try_from(payload.len())?;

        let mut frame = Vec::with_capacity(payload.len() + 5);
        match self.compression {
            Some(CompressionThreshold(threshold)) => {
                let (data_length, data) = if payload.len() >= threshold {
                    let mut encoder =
                        flate2::write::ZlibEncoder::new(Vec::new(), COMPRESSION_LEVEL);
                    encoder.write_all(payload)?;
                    (uncompressed_length, encoder.finish()?)
                } else {
                    // A zero data length marks the frame as uncompressed.
                    (0, payload.to_vec())
                };

                let mut encoder = Encoder::new(&mut frame);
                encoder.write_var_int(
                    var_int_size(data_length) as i32 + i32::try_from(data.len())?,
                );
                encoder.write_var_int(data_length);
                encoder.write_slice(&data);
            }
            None => {
                let mut encoder = Encoder::new(&mut frame);
                encoder.write_var_int(uncompressed_length);
                encoder.write_slice(payload);
            }
        }

        if let Some(encryptor) = &mut self.encryptor {
            for byte in &mut frame {
                let slice = slice::from_mut(byte);
                encryptor.encrypt_block_mut(GenericArray::from_mut_slice(slice));
            }
        }

        Ok(frame)
    }
}

pub fn var_int_size(x: i32) -> usize {
    Encoder::new(&mut Vec::new()).write_var_int(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut FrameDecoder, bytes: &[u8]) {
        let mut copy = bytes.to_vec();
        decoder.give_data(&mut copy);
    }

    #[test]
    fn roundtrip_uncompressed() {
        let mut encoder = FrameEncoder::new();
        let mut decoder = FrameDecoder::new();

        let payload = b"\x00hello world".to_vec();
        let wire = encoder.encode(&payload).unwrap();
        feed(&mut decoder, &wire);

        assert_eq!(decoder.next_frame().unwrap().unwrap(), payload);
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn partial_reads_reassemble_identically() {
        let mut encoder = FrameEncoder::new();
        let payloads: Vec<Vec<u8>> = vec![
            vec![0x00],
            vec![0x17; 300],
            (0..=255).collect(),
        ];
        let mut wire = Vec::new();
        for payload in &payloads {
            wire.extend(encoder.encode(payload).unwrap());
        }

        // Whole-buffer feed.
        let mut single = FrameDecoder::new();
        feed(&mut single, &wire);
        let mut single_frames = Vec::new();
        while let Some(frame) = single.next_frame().unwrap() {
            single_frames.push(frame);
        }

        // One byte at a time, draining after every byte.
        let mut trickle = FrameDecoder::new();
        let mut trickle_frames = Vec::new();
        for byte in &wire {
            feed(&mut trickle, slice::from_ref(byte));
            while let Some(frame) = trickle.next_frame().unwrap() {
                trickle_frames.push(frame);
            }
        }

        assert_eq!(single_frames, payloads);
        assert_eq!(trickle_frames, payloads);
    }

    #[test]
    fn partial_length_prefix_waits_for_more_data() {
        let mut decoder = FrameDecoder::new();
        // A 2-byte varint with only its continuation byte received.
        feed(&mut decoder, &[0x80]);
        assert!(decoder.next_frame().unwrap().is_none());
        // Completing the prefix (length 384) still yields no frame...
        feed(&mut decoder, &[0x03]);
        assert!(decoder.next_frame().unwrap().is_none());
        // ...until the payload arrives.
        feed(&mut decoder, &vec![0xAB; 384]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0xAB; 384]);
    }

    #[test]
    fn below_threshold_frames_carry_zero_marker() {
        let mut encoder = FrameEncoder::new();
        encoder.enable_compression(CompressionThreshold::new(256));

        let payload = vec![0x2A; 16];
        let wire = encoder.encode(&payload).unwrap();
        // frame length, then the zero "not compressed" marker, then the
        // payload verbatim.
        assert_eq!(wire[0] as usize, 1 + payload.len());
        assert_eq!(wire[1], 0);
        assert_eq!(&wire[2..], &payload[..]);

        let mut decoder = FrameDecoder::new();
        decoder.enable_compression();
        feed(&mut decoder, &wire);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), payload);
    }

    #[test]
    fn above_threshold_frames_roundtrip_compressed() {
        let mut encoder = FrameEncoder::new();
        encoder.enable_compression(CompressionThreshold::new(64));
        let mut decoder = FrameDecoder::new();
        decoder.enable_compression();

        let payload = vec![0x55; 4096];
        let wire = encoder.encode(&payload).unwrap();
        // Compressible data must actually shrink on the wire.
        assert!(wire.len() < payload.len());

        feed(&mut decoder, &wire);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), payload);
    }

    #[test]
    fn encrypted_roundtrip() {
        let key = EncryptionKey::new([7; 16]);
        let mut encoder = FrameEncoder::new();
        encoder.enable_encryption(key);
        let mut decoder = FrameDecoder::new();
        decoder.enable_encryption(key);

        let payloads = [b"first".to_vec(), b"second".to_vec()];
        for payload in &payloads {
            let wire = encoder.encode(payload).unwrap();
            // Ciphertext must differ from the plain frame.
            assert_ne!(&wire[1..], &payload[..]);
            feed(&mut decoder, &wire);
            assert_eq!(decoder.next_frame().unwrap().unwrap(), *payload);
        }
    }

    #[test]
    fn oversized_frame_fails() {
        let mut decoder = FrameDecoder::new();
        let mut wire = Vec::new();
        Encoder::new(&mut wire).write_var_int((BUFFER_LIMIT + 1) as i32);
        feed(&mut decoder, &wire);
        assert!(matches!(
            decoder.next_frame(),
            Err(DecodeError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn negative_frame_length_fails() {
        let mut decoder = FrameDecoder::new();
        let mut wire = Vec::new();
        Encoder::new(&mut wire).write_var_int(-1);
        feed(&mut decoder, &wire);
        assert!(matches!(
            decoder.next_frame(),
            Err(DecodeError::NegativeLength)
        ));
    }
}
