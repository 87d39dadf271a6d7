use ks::KnowledgeError;

/// Process exit status for an error returned by a command handler.
///
/// Store errors keep their own status, anything else exits with 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<KnowledgeError>()
        .map_or(1, KnowledgeError::exit_code)
}
