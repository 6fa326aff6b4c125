pub mod capture;
pub mod synth;

pub use capture::{
    CaptureEvent, RecognizerEvent, SpeechCaptureSession, SpeechRecognizer, Utterance, UtteranceEnd,
};
pub use synth::{AudioBytes, AudioPlayer, ResponseSynthesizer, SpeakOutcome, SpeechSynthesizer};
