/// Admin coordinator: admission, game lifecycle and comm handling.
pub mod admin_service;
/// Baron device: code submission and damage reports.
pub mod baron_service;
/// Comm transports, inbox bookkeeping and the inbox pump.
pub mod comms;
/// Game state reads, writes and admin transitions.
pub mod game_state_service;
/// Lobby seating, readiness, roles and the start condition.
pub mod lobby_service;
/// MCQ device: team codes, answers and question requests.
pub mod mcq_service;
/// Question bank loading.
pub mod question_bank;
/// Room directory: creation, activity, lock and departure.
pub mod room_service;
/// Wait-list requests and admin admission.
pub mod waitlist_service;
