use crate::session::ThreadKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    ChatBot,
    PdfReader,
    ImageNerd,
    CroptoIndicator,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::ChatBot,
        Mode::PdfReader,
        Mode::ImageNerd,
        Mode::CroptoIndicator,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Mode::ChatBot => "ChatBot",
            Mode::PdfReader => "PDF Reader",
            Mode::ImageNerd => "Image Nerd",
            Mode::CroptoIndicator => "Cropto Indicator",
        }
    }

    /// Conversation thread backing this mode, if it keeps one.
    pub fn select(&self) -> Option<ThreadKey> {
        match self {
            Mode::ChatBot => Some(ThreadKey::Chat),
            Mode::PdfReader => Some(ThreadKey::Pdf),
            // One-shot questions, nothing to remember.
            Mode::ImageNerd => None,
            Mode::CroptoIndicator => None,
        }
    }
}

pub const CROPTO_NOTICE: &str = "Still in development. It will be included in the next update.
This project will only cover meme coins on the Solana blockchain. It will validate projects and help identify strong ones.

Features to expect:
  • Swapping of crypto using BonkBot
  • Validation of the project (rug pull or not)
  • Charts and the data needed for a human check
  • Calls on newly launched projects";
