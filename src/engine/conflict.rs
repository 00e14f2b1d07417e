use crate::model::*;

/// Does an active row block a new request of `kind` on `resource`?
///
/// Reads only conflict with an active write; writes conflict with anything on
/// the same resource. Different resources never conflict.
pub(crate) fn conflicts(active: &ActiveSlot, resource: ResourceId, kind: OpKind) -> bool {
    active.resource == resource && (kind.is_exclusive() || active.kind.is_exclusive())
}

/// First row that blocks the request, if any.
pub(crate) fn find_conflict<'a>(
    rows: impl IntoIterator<Item = &'a ActiveSlot>,
    resource: ResourceId,
    kind: OpKind,
) -> Option<&'a ActiveSlot> {
    rows.into_iter().find(|row| conflicts(row, resource, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(resource: ResourceId, kind: OpKind) -> ActiveSlot {
        ActiveSlot {
            resource,
            kind,
            owner: 1,
        }
    }

    #[test]
    fn reads_share() {
        assert!(!conflicts(&slot(1, OpKind::Read), 1, OpKind::Read));
    }

    #[test]
    fn read_blocked_by_write() {
        assert!(conflicts(&slot(1, OpKind::Write), 1, OpKind::Read));
    }

    #[test]
    fn write_blocked_by_anything() {
        assert!(conflicts(&slot(1, OpKind::Read), 1, OpKind::Write));
        assert!(conflicts(&slot(1, OpKind::Write), 1, OpKind::Write));
    }

    #[test]
    fn different_resources_never_conflict() {
        for active in [OpKind::Read, OpKind::Write] {
            for req in [OpKind::Read, OpKind::Write] {
                assert!(!conflicts(&slot(1, active), 2, req));
            }
        }
    }

    #[test]
    fn find_conflict_returns_first_blocker() {
        let rows = [slot(1, OpKind::Read), slot(2, OpKind::Write), slot(1, OpKind::Read)];
        assert!(find_conflict(&rows, 1, OpKind::Read).is_none());
        assert_eq!(find_conflict(&rows, 1, OpKind::Write), Some(&rows[0]));
        assert_eq!(find_conflict(&rows, 2, OpKind::Read), Some(&rows[1]));
        assert!(find_conflict(&rows, 3, OpKind::Write).is_none());
    }
}
