pub mod face_track;
pub mod track_set;
