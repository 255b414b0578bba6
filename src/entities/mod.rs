pub mod artist;
pub mod community;
pub mod community_invite;
pub mod community_member;
pub mod profile;
pub mod release;
pub mod rsvp;
pub mod show;
