//! Event names published by sources, settings and source holders.

pub const BEFORE_USER_CREATE: &str = "BeforeUserCreate";
pub const AFTER_USER_CREATE: &str = "AfterUserCreate";
pub const BEFORE_USER_DELETE: &str = "BeforeUserDelete";
pub const AFTER_USER_DELETE: &str = "AfterUserDelete";
pub const BEFORE_USER_RENAME: &str = "BeforeUserRename";
pub const AFTER_USER_RENAME: &str = "AfterUserRename";

pub const BEFORE_BACKLOG_CREATE: &str = "BeforeBacklogCreate";
pub const AFTER_BACKLOG_CREATE: &str = "AfterBacklogCreate";
pub const BEFORE_BACKLOG_DELETE: &str = "BeforeBacklogDelete";
pub const AFTER_BACKLOG_DELETE: &str = "AfterBacklogDelete";
pub const BEFORE_BACKLOG_RENAME: &str = "BeforeBacklogRename";
pub const AFTER_BACKLOG_RENAME: &str = "AfterBacklogRename";
pub const BEFORE_BACKLOG_REORDER: &str = "BeforeBacklogReorder";
pub const AFTER_BACKLOG_REORDER: &str = "AfterBacklogReorder";

pub const BEFORE_WORKITEM_CREATE: &str = "BeforeWorkitemCreate";
pub const AFTER_WORKITEM_CREATE: &str = "AfterWorkitemCreate";
pub const BEFORE_WORKITEM_COMPLETE: &str = "BeforeWorkitemComplete";
pub const AFTER_WORKITEM_COMPLETE: &str = "AfterWorkitemComplete";
pub const BEFORE_WORKITEM_START: &str = "BeforeWorkitemStart";
pub const AFTER_WORKITEM_START: &str = "AfterWorkitemStart";
pub const BEFORE_WORKITEM_DELETE: &str = "BeforeWorkitemDelete";
pub const AFTER_WORKITEM_DELETE: &str = "AfterWorkitemDelete";
pub const BEFORE_WORKITEM_RENAME: &str = "BeforeWorkitemRename";
pub const AFTER_WORKITEM_RENAME: &str = "AfterWorkitemRename";
pub const BEFORE_WORKITEM_REORDER: &str = "BeforeWorkitemReorder";
pub const AFTER_WORKITEM_REORDER: &str = "AfterWorkitemReorder";
pub const BEFORE_WORKITEM_MOVE: &str = "BeforeWorkitemMove";
pub const AFTER_WORKITEM_MOVE: &str = "AfterWorkitemMove";

pub const BEFORE_POMODORO_ADD: &str = "BeforePomodoroAdd";
pub const AFTER_POMODORO_ADD: &str = "AfterPomodoroAdd";
pub const BEFORE_POMODORO_REMOVE: &str = "BeforePomodoroRemove";
pub const AFTER_POMODORO_REMOVE: &str = "AfterPomodoroRemove";
pub const BEFORE_POMODORO_WORK_START: &str = "BeforePomodoroWorkStart";
pub const AFTER_POMODORO_WORK_START: &str = "AfterPomodoroWorkStart";
pub const BEFORE_POMODORO_REST_START: &str = "BeforePomodoroRestStart";
pub const AFTER_POMODORO_REST_START: &str = "AfterPomodoroRestStart";
pub const BEFORE_POMODORO_COMPLETE: &str = "BeforePomodoroComplete";
pub const AFTER_POMODORO_COMPLETE: &str = "AfterPomodoroComplete";
pub const BEFORE_POMODORO_VOIDED: &str = "BeforePomodoroVoided";
pub const AFTER_POMODORO_VOIDED: &str = "AfterPomodoroVoided";
pub const BEFORE_POMODORO_INTERRUPTED: &str = "BeforePomodoroInterrupted";
pub const AFTER_POMODORO_INTERRUPTED: &str = "AfterPomodoroInterrupted";

pub const BEFORE_CATEGORY_CREATE: &str = "BeforeCategoryCreate";
pub const AFTER_CATEGORY_CREATE: &str = "AfterCategoryCreate";
pub const BEFORE_CATEGORY_DELETE: &str = "BeforeCategoryDelete";
pub const AFTER_CATEGORY_DELETE: &str = "AfterCategoryDelete";
pub const BEFORE_CATEGORY_RENAME: &str = "BeforeCategoryRename";
pub const AFTER_CATEGORY_RENAME: &str = "AfterCategoryRename";

pub const TAG_CREATED: &str = "TagCreated";
pub const TAG_DELETED: &str = "TagDeleted";
pub const TAG_CONTENT_CHANGED: &str = "TagContentChanged";

pub const TIMER_WORK_START: &str = "TimerWorkStart";
pub const TIMER_WORK_COMPLETE: &str = "TimerWorkComplete";
pub const TIMER_REST_COMPLETE: &str = "TimerRestComplete";

pub const SOURCE_MESSAGES_REQUESTED: &str = "SourceMessagesRequested";
pub const SOURCE_MESSAGES_PROCESSED: &str = "SourceMessagesProcessed";
pub const BEFORE_MESSAGE_PROCESSED: &str = "BeforeMessageProcessed";
pub const AFTER_MESSAGE_PROCESSED: &str = "AfterMessageProcessed";

pub const WENT_ONLINE: &str = "WentOnline";
pub const WENT_OFFLINE: &str = "WentOffline";
pub const SOCKET_CONNECTED: &str = "SocketConnected";
pub const SOCKET_DISCONNECTED: &str = "SocketDisconnected";
pub const SOCKET_ERROR: &str = "SocketError";
pub const SOCKET_MESSAGE_RECEIVED: &str = "SocketMessageReceived";

pub const BEFORE_SETTINGS_CHANGED: &str = "BeforeSettingsChanged";
pub const AFTER_SETTINGS_CHANGED: &str = "AfterSettingsChanged";

pub const BEFORE_SOURCE_CHANGED: &str = "BeforeSourceChanged";
pub const AFTER_SOURCE_CHANGED: &str = "AfterSourceChanged";

/// Everything an event source publishes.
pub const SOURCE_EVENTS: &[&str] = &[
    BEFORE_USER_CREATE,
    AFTER_USER_CREATE,
    BEFORE_USER_DELETE,
    AFTER_USER_DELETE,
    BEFORE_USER_RENAME,
    AFTER_USER_RENAME,
    BEFORE_BACKLOG_CREATE,
    AFTER_BACKLOG_CREATE,
    BEFORE_BACKLOG_DELETE,
    AFTER_BACKLOG_DELETE,
    BEFORE_BACKLOG_RENAME,
    AFTER_BACKLOG_RENAME,
    BEFORE_BACKLOG_REORDER,
    AFTER_BACKLOG_REORDER,
    BEFORE_WORKITEM_CREATE,
    AFTER_WORKITEM_CREATE,
    BEFORE_WORKITEM_COMPLETE,
    AFTER_WORKITEM_COMPLETE,
    BEFORE_WORKITEM_START,
    AFTER_WORKITEM_START,
    BEFORE_WORKITEM_DELETE,
    AFTER_WORKITEM_DELETE,
    BEFORE_WORKITEM_RENAME,
    AFTER_WORKITEM_RENAME,
    BEFORE_WORKITEM_REORDER,
    AFTER_WORKITEM_REORDER,
    BEFORE_WORKITEM_MOVE,
    AFTER_WORKITEM_MOVE,
    BEFORE_POMODORO_ADD,
    AFTER_POMODORO_ADD,
    BEFORE_POMODORO_REMOVE,
    AFTER_POMODORO_REMOVE,
    BEFORE_POMODORO_WORK_START,
    AFTER_POMODORO_WORK_START,
    BEFORE_POMODORO_REST_START,
    AFTER_POMODORO_REST_START,
    BEFORE_POMODORO_COMPLETE,
    AFTER_POMODORO_COMPLETE,
    BEFORE_POMODORO_VOIDED,
    AFTER_POMODORO_VOIDED,
    BEFORE_POMODORO_INTERRUPTED,
    AFTER_POMODORO_INTERRUPTED,
    BEFORE_CATEGORY_CREATE,
    AFTER_CATEGORY_CREATE,
    BEFORE_CATEGORY_DELETE,
    AFTER_CATEGORY_DELETE,
    BEFORE_CATEGORY_RENAME,
    AFTER_CATEGORY_RENAME,
    TAG_CREATED,
    TAG_DELETED,
    TAG_CONTENT_CHANGED,
    TIMER_WORK_START,
    TIMER_WORK_COMPLETE,
    TIMER_REST_COMPLETE,
    SOURCE_MESSAGES_REQUESTED,
    SOURCE_MESSAGES_PROCESSED,
    BEFORE_MESSAGE_PROCESSED,
    AFTER_MESSAGE_PROCESSED,
    WENT_ONLINE,
    WENT_OFFLINE,
    SOCKET_CONNECTED,
    SOCKET_DISCONNECTED,
    SOCKET_ERROR,
    SOCKET_MESSAGE_RECEIVED,
];

pub const SETTINGS_EVENTS: &[&str] = &[BEFORE_SETTINGS_CHANGED, AFTER_SETTINGS_CHANGED];

pub const HOLDER_EVENTS: &[&str] = &[BEFORE_SOURCE_CHANGED, AFTER_SOURCE_CHANGED];
