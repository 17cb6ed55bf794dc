//! Audio container formats negotiated with providers and the transcoder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TtsError;

/// Supported audio containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
    Flac,
}

impl AudioFormat {
    /// All supported formats, in a stable order.
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Ogg,
        AudioFormat::Flac,
    ];

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
        }
    }

    /// Demuxer name understood by the external decoder's `-f` flag.
    pub fn demuxer(&self) -> &'static str {
        self.extension()
    }

    /// Parse from a file extension, case-insensitive.
    pub fn from_extension(ext: &str) -> Option<AudioFormat> {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            "ogg" => Some(AudioFormat::Ogg),
            "flac" => Some(AudioFormat::Flac),
            _ => None,
        }
    }

    /// Sniff the container from the first bytes of a file.
    pub fn detect(bytes: &[u8]) -> Option<AudioFormat> {
        if bytes.starts_with(b"fLaC") {
            Some(AudioFormat::Flac)
        } else if bytes.starts_with(b"OggS") {
            Some(AudioFormat::Ogg)
        } else if bytes.starts_with(b"RIFF") {
            Some(AudioFormat::Wav)
        } else if bytes.starts_with(b"ID3")
            || (bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0)
        {
            Some(AudioFormat::Mp3)
        } else {
            None
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioFormat::from_extension(s.trim()).ok_or_else(|| {
            TtsError::Format(format!(
                "unknown format '{}', expected one of: mp3, wav, ogg, flac",
                s
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_round_trip() {
        for format in AudioFormat::ALL {
            assert_eq!(AudioFormat::from_extension(format.extension()), Some(format));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("FLAC".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert!("aiff".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_signature_detection() {
        assert_eq!(AudioFormat::detect(b"fLaC\x00\x00"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::detect(b"OggS rest"), Some(AudioFormat::Ogg));
        assert_eq!(AudioFormat::detect(b"RIFF....WAVE"), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::detect(b"ID3\x04"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::detect(&[0xFF, 0xFB, 0x90]), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::detect(b"not audio"), None);
    }

    #[test]
    fn test_default_is_mp3() {
        assert_eq!(AudioFormat::default(), AudioFormat::Mp3);
    }
}
