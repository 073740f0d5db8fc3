pub mod anilist;
pub mod tracemoe;
