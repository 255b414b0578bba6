pub mod artists;
pub mod calendar;
pub mod communities;
pub mod profile;
pub mod shows;
