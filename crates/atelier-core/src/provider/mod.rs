//! Generation provider boundary
//!
//! The provider is an external collaborator. Atelier only needs a way to open
//! a stateful editing session and to exchange messages with it; the session
//! owns its own conversation memory.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, Usage};
use crate::error::Error;

/// Output aspect ratio for a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    Portrait,
    #[serde(rename = "3:2")]
    Landscape,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "21:9")]
    UltraWide,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Wide,
        AspectRatio::UltraWide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "2:3",
            AspectRatio::Landscape => "3:2",
            AspectRatio::Wide => "16:9",
            AspectRatio::UltraWide => "21:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unsupported aspect_ratio '{}'. Use one of: 1:1, 2:3, 3:2, 16:9, 21:9",
                    s
                ))
            })
    }
}

/// Output resolution for a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(ImageSize::OneK),
            "2K" => Ok(ImageSize::TwoK),
            "4K" => Ok(ImageSize::FourK),
            _ => Err(Error::InvalidArgument(format!(
                "unsupported image_size '{}'. Use one of: 1K, 2K, 4K",
                s
            ))),
        }
    }
}

/// Options applied when opening a provider session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Model override; `None` uses the provider's default editing model
    pub model: Option<String>,
    /// Optional system-level guidance for the whole session
    pub system_instruction: Option<String>,
}

/// Options for a single turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOptions {
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
}

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// One entry of a provider session's conversation history
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub message: String,
    pub artifacts: Vec<Artifact>,
}

/// What a provider returned for one message
#[derive(Debug, Clone, Default)]
pub struct TurnResponse {
    /// Model text, empty when the model only produced artifacts
    pub text: String,
    pub artifacts: Vec<Artifact>,
    pub usage: Option<Usage>,
}

/// A provider capable of opening multi-turn editing sessions
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Open a new stateful editing session
    async fn create_session(&self, options: &SessionOptions) -> anyhow::Result<Box<dyn EditSession>>;
}

/// A stateful, provider-held editing conversation
///
/// A session must not be used after `close` returns. Atelier guarantees it
/// never calls `send_message` concurrently on the same session.
#[async_trait]
pub trait EditSession: Send + Sync {
    /// Send a message; on success the turn is part of the session history
    async fn send_message(&self, message: &str, options: &TurnOptions) -> anyhow::Result<TurnResponse>;

    /// Conversation history, oldest first
    fn history(&self) -> Vec<Turn>;

    /// Release provider-side resources
    async fn close(&self) -> anyhow::Result<()>;
}
