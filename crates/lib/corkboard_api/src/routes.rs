//! Route paths.

/// `GET` sync status, `DELETE` disconnect.
pub const BOARD_CALENDAR: &str = "/api/boards/{board_id}/calendar";
pub const GET_BOARD_CALENDAR_CALENDARS: &str = "/api/boards/{board_id}/calendar/calendars";
pub const PUT_BOARD_CALENDAR_SELECTION: &str = "/api/boards/{board_id}/calendar/selection";
pub const POST_BOARD_CALENDAR_SYNC: &str = "/api/boards/{board_id}/calendar/sync";
pub const PUT_BOARD_CALENDAR_RANGE: &str = "/api/boards/{board_id}/calendar/range";
pub const POST_BOARD_CALENDAR_CONNECT: &str = "/api/boards/{board_id}/calendar/connect";
pub const GET_AUTH_GOOGLE_CALLBACK: &str = "/auth/google/callback";
