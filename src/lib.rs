pub mod ebi_framework {
    pub mod activity_key;
    pub mod ebi_command;
    pub mod ebi_input;
    pub mod ebi_output;
    pub mod infoable;
    pub mod model_error;
}
pub mod ebi_commands {
    pub mod ebi_command_conformance;
    pub mod ebi_command_info;
}
pub mod ebi_objects {
    pub mod accepting_petri_net;
    pub mod alignments;
    pub mod event_log;
    pub mod guard_expression;
    pub mod labelled_petri_net;
    pub mod transition_properties;
}
pub mod ebi_alignments {
    pub mod cross_product_net;
    pub mod cross_product_search_state;
    pub mod linear_programming_solver;
    pub mod marking_interner;
    pub mod search_engine;
    pub mod trace_net;
}
pub mod semantics {
    pub mod labelled_petri_net_semantics;
    pub mod semantics;
}
pub mod math {
    pub mod levenshtein;
}
pub mod techniques {
    pub mod align;
    pub mod fitness;
    pub mod playout;
}
pub mod marking;
