pub mod cached;
pub mod job;
pub mod parsed;
pub mod quiz;

pub use cached::CachedAnswer;
pub use job::QuizJob;
pub use parsed::{ParsedChoice, ParsedDocument, ParsedQuestion};
pub use quiz::{
    AnswerSource, Choice, DocumentKind, Question, Quiz, QuizStatus, SectionCount, UploadOutcome,
};
