/// `num` votes (or matches) out of `total` members form a strict majority.
pub(crate) fn is_majority(
    num: usize,
    total: usize,
) -> bool {
    num > total / 2
}
