//! Engine roles (recognition, translation, synthesis) and their backends.

pub mod pool;
pub mod recognizer;
pub mod registry;
pub mod synthesizer;
pub mod translator;

pub use pool::EnginePool;
pub use recognizer::{RecognitionEvent, Recognizer, ScriptedRecognizer, ScriptedUtterance};
pub use registry::Engines;
pub use synthesizer::{
    MockSynthesizer, SilenceSynthesizer, SynthesisCall, Synthesizer, ToneSynthesizer,
};
#[cfg(feature = "http")]
pub use translator::HttpTranslator;
pub use translator::{MockTranslator, PassthroughTranslator, Translator};
