use crate::proto::Entry;

pub struct EntryBuilder {
    index: u64,
    term: u64,
}

impl EntryBuilder {
    pub fn new(
        start_index: u64,
        term: u64,
    ) -> Self {
        Self {
            index: start_index,
            term,
        }
    }

    pub fn command(
        mut self,
        data: &[u8],
    ) -> (Self, Entry) {
        let entry = Entry {
            index: self.index,
            term: self.term,
            command: data.to_vec(),
        };
        self.index += 1;
        (self, entry)
    }

    /// Builds `count` consecutive entries with generated payloads.
    pub fn commands(
        mut self,
        count: usize,
    ) -> (Self, Vec<Entry>) {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let payload = format!("cmd-{}-{}", self.term, self.index);
            let (next, entry) = self.command(payload.as_bytes());
            self = next;
            entries.push(entry);
        }
        (self, entries)
    }
}
