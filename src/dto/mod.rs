pub mod anti_cheat_dto;
pub mod match_dto;
pub mod session_dto;
pub mod vetting_dto;
