pub mod anti_cheat;
pub mod audit_log;
pub mod category;
pub mod domain_event;
pub mod experience;
pub mod freelancer;
pub mod match_record;
pub mod project;
pub mod question;
pub mod skill_test_session;
pub mod user;
pub mod vetting_result;
