use std::fmt;
use std::ops::AddAssign;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub num_blocks: usize,
    pub num_candidate_nodes: usize,
    pub num_candidate_ways: usize,
    pub num_candidate_relations: usize,
    pub num_member_ways: usize,
    pub num_captured_nodes: usize,
    pub num_unresolved_node_ids: usize,
    pub num_unresolved_way_ids: usize,
    pub num_dropped_ways: usize,
    pub num_rows: usize,
}

impl AddAssign for Stats {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.num_blocks += other.num_blocks;
        self.num_candidate_nodes += other.num_candidate_nodes;
        self.num_candidate_ways += other.num_candidate_ways;
        self.num_candidate_relations += other.num_candidate_relations;
        self.num_member_ways += other.num_member_ways;
        self.num_captured_nodes += other.num_captured_nodes;
        self.num_unresolved_node_ids += other.num_unresolved_node_ids;
        self.num_unresolved_way_ids += other.num_unresolved_way_ids;
        self.num_dropped_ways += other.num_dropped_ways;
        self.num_rows += other.num_rows;
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            r#"Scanned blocks: {}
Candidates:
  nodes:        {}
  ways:         {}
  relations:    {}
  member ways:  {}
Captured nodes: {}
Unresolved ids:
  nodes:        {}
  ways:         {}
Dropped ways:   {}
Rows:           {}"#,
            self.num_blocks,
            self.num_candidate_nodes,
            self.num_candidate_ways,
            self.num_candidate_relations,
            self.num_member_ways,
            self.num_captured_nodes,
            self.num_unresolved_node_ids,
            self.num_unresolved_way_ids,
            self.num_dropped_ways,
            self.num_rows
        )
    }
}
