pub mod health;
pub mod markets;
pub mod portfolio;
