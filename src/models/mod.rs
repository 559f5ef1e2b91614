pub mod achievement;
pub mod classroom;
pub mod issue;
pub mod progression;
