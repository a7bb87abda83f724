mod cms_decode;
mod journal;

pub use cms_decode::{decode_enveloped_data, DecodedEnvelope, EnvelopeError};
pub use journal::{is_journal_wrapped, replay_journal, JournalError, JOURNAL_MAGIC};
