pub mod quality;
pub mod range;
pub mod sequence;
pub mod translate;

pub use quality::{SequenceQuality, SequenceWithQuality};
pub use range::Range;
pub use sequence::{Sequence, SequenceBuilder};
pub use translate::{translate, AaPosition, TranslationParameters};
