pub mod indexing_engine;
pub mod planner;
pub mod scanner;
