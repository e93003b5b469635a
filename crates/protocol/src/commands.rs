//! Command tags for the peer channel.
//!
//! `RECEIVE_*` tags arrive from the documentation peer; `SEND_*` tags are
//! emitted by the server. Spellings are wire-stable: renaming one here is a
//! protocol break for every connected client.

// Inbound: diff/patch engine.
pub const RECEIVE_EDIT_FIX: &str = "EDIT_FIX";
pub const RECEIVE_MODIFIED_FILE_CONTENT: &str = "LLM_MODIFIED_FILE_CONTENT";
pub const RECEIVE_ACCEPT_EDIT_FIX: &str = "ACCEPT_EDIT_FIX";
pub const RECEIVE_REJECT_EDIT_FIX: &str = "REJECT_EDIT_FIX";

// Inbound: rule/tag store.
pub const RECEIVE_MODIFIED_RULE: &str = "MODIFIED_RULE";
pub const RECEIVE_NEW_RULE: &str = "NEW_RULE";
pub const RECEIVE_MODIFIED_TAG: &str = "MODIFIED_TAG";
pub const RECEIVE_NEW_TAG: &str = "NEW_TAG";

// Inbound: ad-hoc snippet conversion.
pub const RECEIVE_SNIPPET_TO_REPR: &str = "EXPR_STMT";

// Inbound: mining gateway (learning data drop + run request).
pub const RECEIVE_REFRESH_LEARNING_DIR: &str = "REFRESH_LEARNING_DR_DIRECTORY";
pub const RECEIVE_LEARNING_DATABASE: &str = "LEARN_DESIGN_RULES_DATABASE";
pub const RECEIVE_LEARNING_DATABASE_APPEND: &str = "LEARN_DESIGN_RULES_DATABASE_APPEND";
pub const RECEIVE_LEARNING_FEATURES: &str = "LEARN_DESIGN_RULES_FEATURES";
pub const RECEIVE_LEARNING_FEATURES_APPEND: &str = "LEARN_DESIGN_RULES_FEATURES_APPEND";
pub const RECEIVE_LEARNING_HELPER_FILES: &str = "LEARN_DESIGN_RULES_HELPER_FILES";
pub const RECEIVE_LEARNING_HELPER_FILES_APPEND: &str = "LEARN_DESIGN_RULES_HELPER_FILES_APPEND";
pub const RECEIVE_MINE_DESIGN_RULES: &str = "MINE_DESIGN_RULES";

// Outbound: connection handshake.
pub const SEND_ENTER: &str = "ENTER";
pub const SEND_PROJECT_PATH: &str = "PROJECT_PATH";
pub const SEND_PROJECT_HIERARCHY: &str = "PROJECT_HIERARCHY";
pub const SEND_REPR_FILES: &str = "REPR_FILES";
pub const SEND_RULE_TABLE: &str = "RULE_TABLE";
pub const SEND_TAG_TABLE: &str = "TAG_TABLE";
pub const SEND_VERIFY_RULES: &str = "VERIFY_RULES";

// Outbound: live mirror updates.
pub const SEND_UPDATE_REPR: &str = "UPDATE_REPR";
pub const SEND_CHECK_RULES_FOR_FILE: &str = "CHECK_RULES_FOR_FILE";
pub const SEND_FILE_CHANGE: &str = "FILE_CHANGE";

// Outbound: diff/patch engine.
pub const SEND_CONTENT_FOR_EDIT_FIX: &str = "CONTENT_FOR_EDIT_FIX";
pub const SEND_EDIT_FIX_PREVIEW: &str = "EDIT_FIX_PREVIEW";

// Outbound: rule/tag store acks, always echoing the request payload.
pub const SEND_UPDATE_RULE: &str = "UPDATE_RULE";
pub const SEND_FAILED_UPDATE_RULE: &str = "FAILED_UPDATE_RULE";
pub const SEND_NEW_RULE: &str = "NEW_RULE";
pub const SEND_FAILED_NEW_RULE: &str = "FAILED_NEW_RULE";
pub const SEND_UPDATE_TAG: &str = "UPDATE_TAG";
pub const SEND_FAILED_UPDATE_TAG: &str = "FAILED_UPDATE_TAG";
pub const SEND_NEW_TAG: &str = "NEW_TAG";
pub const SEND_FAILED_NEW_TAG: &str = "FAILED_NEW_TAG";

// Outbound: snippet conversion and mining.
pub const SEND_SNIPPET_REPR: &str = "EXPR_STMT_REPR";
pub const SEND_MINED_DESIGN_RULES: &str = "MINED_DESIGN_RULES";
pub const SEND_DOI_INFORMATION: &str = "DOI_INFORMATION";

/// Tags owned by the rule/tag/fix subsystem; used by the dispatcher to route.
pub const RULES_AND_FIXES_COMMANDS: &[&str] = &[
    RECEIVE_EDIT_FIX,
    RECEIVE_MODIFIED_FILE_CONTENT,
    RECEIVE_ACCEPT_EDIT_FIX,
    RECEIVE_REJECT_EDIT_FIX,
    RECEIVE_MODIFIED_RULE,
    RECEIVE_NEW_RULE,
    RECEIVE_MODIFIED_TAG,
    RECEIVE_NEW_TAG,
    RECEIVE_SNIPPET_TO_REPR,
];

/// Tags owned by the mining gateway.
pub const MINING_COMMANDS: &[&str] = &[
    RECEIVE_REFRESH_LEARNING_DIR,
    RECEIVE_LEARNING_DATABASE,
    RECEIVE_LEARNING_DATABASE_APPEND,
    RECEIVE_LEARNING_FEATURES,
    RECEIVE_LEARNING_FEATURES_APPEND,
    RECEIVE_LEARNING_HELPER_FILES,
    RECEIVE_LEARNING_HELPER_FILES_APPEND,
    RECEIVE_MINE_DESIGN_RULES,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_tag_sets_are_disjoint() {
        for tag in RULES_AND_FIXES_COMMANDS {
            assert!(!MINING_COMMANDS.contains(tag), "{tag} owned twice");
        }
    }
}
