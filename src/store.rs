//! Persistence contract. The core never picks a backend; callers hand one in.

use crate::error::Result;
use crate::models::achievement::UnlockedAchievements;
use crate::models::classroom::Classroom;
use crate::models::progression::ProgressionState;

pub trait ProgressionStore: Send + Sync {
    fn load_progression(&self, user_id: &str) -> Result<Option<ProgressionState>>;
    fn save_progression(&self, user_id: &str, state: &ProgressionState) -> Result<()>;
    fn load_achievements(&self, user_id: &str) -> Result<UnlockedAchievements>;
    fn save_achievements(&self, user_id: &str, unlocked: &UnlockedAchievements) -> Result<()>;
}

pub trait ClassroomStore: Send + Sync {
    fn load_classroom(&self, classroom_id: &str) -> Result<Option<Classroom>>;
    fn save_classroom(&self, classroom: &Classroom) -> Result<()>;
}
