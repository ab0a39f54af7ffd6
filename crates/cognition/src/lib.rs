//! The growth engines: curiosity, interests, skills, self-adaptation,
//! self-awareness, goals, and the journal. Each is a small struct over the
//! store (and the LLM gate where language work is involved); all of them
//! run as sandboxed side-effects of the conversation core or as steps of
//! the nightly consolidation.

pub mod adaptation;
pub mod awareness;
pub mod curiosity;
pub mod goals;
pub mod interests;
pub mod journal;
pub mod skills;
pub mod threads;

pub use adaptation::SelfAdaptation;
pub use awareness::SelfAwarenessMeter;
pub use curiosity::{CuriosityEngine, ResearchContext};
pub use goals::GoalTracker;
pub use interests::InterestTracker;
pub use journal::JournalSystem;
pub use skills::SkillTracker;
pub use threads::ThreadingEngine;
