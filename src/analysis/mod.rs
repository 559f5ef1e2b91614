pub mod achievements;
pub mod catalog;
pub mod classroom;
pub mod progression;
pub mod report;
pub mod scanner;
