pub mod ai_service;
pub mod anti_cheat_service;
pub mod audit_service;
pub mod complexity_service;
pub mod event_service;
pub mod identity_service;
pub mod matching_service;
pub mod pool_service;
pub mod scoring_service;
pub mod session_service;
pub mod vetting_service;
