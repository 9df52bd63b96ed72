//! Voice guidance: quota, narration and output seams.

pub mod narration;
pub mod quota;
pub mod speech;

pub use narration::{NarrationCoordinator, SILENT_MODE_KEY};
pub use quota::{QuotaGate, QuotaRecord, QuotaStatus, QUOTA_KEY};
pub use speech::{Haptics, NoopHaptics, RecordingSpeech, SpeechBackend, SpeechCall, SpeechOptions};
