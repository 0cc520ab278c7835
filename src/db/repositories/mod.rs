mod segments;
mod sessions;
