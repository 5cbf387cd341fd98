use uuid::Uuid;

/// Mint a time-ordered identifier for a new row.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_parseable_uuids() {
        let id = new_uuid_v7();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn ids_sort_by_creation_order() {
        let a = new_uuid_v7();
        let b = new_uuid_v7();
        assert!(a <= b);
    }
}
