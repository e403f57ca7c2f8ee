//! # ygg_common
//!
//! Shared domain types and pure engines for the Yggdrasil verification
//! pipeline. Everything here is synchronous and I/O-free: the branch
//! partition, node and audit types, the query classifier, the
//! disinformation filter, the Shapley attributor, and the wire contracts.
//! The daemon crate (`yggd`) supplies storage, adapters, and scheduling.

pub mod api;
pub mod audit;
pub mod branch;
pub mod classifier;
pub mod council;
pub mod disinfo;
pub mod error;
pub mod graph;
pub mod node;
pub mod shapley;
pub mod source;
pub mod trace;

pub use api::{
    ComponentHealth, HealthComponents, HealthResponse, QueryOptions, RefusalReason, StreamEvent,
    YggdrasilRequest, YggdrasilResponse,
};
pub use audit::{AuditAction, AuditEntry};
pub use branch::{check_partition, Branch};
pub use classifier::{classify, Classification, Complexity, QueryDomain, QueryType};
pub use council::{
    derive_verdict, ChallengeSeverity, CouncilDeliberation, CouncilMember, CouncilMemberResponse,
    LokiChallenge, Verdict, VerdictKind, Vote, VoteCounts,
};
pub use disinfo::{
    analyze as analyze_disinfo, ContentMetadata, DisinfoAnalysis, DisinfoSeverity, DisinfoType,
    Recommendation,
};
pub use error::{YggError, YggResult};
pub use graph::{
    CascadeResult, Checkpoint, DependencyEdge, DependencyRelation, NodeSnapshot, RollbackReport,
    CASCADE_STRENGTH_THRESHOLD,
};
pub use node::{
    compute_velocity, normalize_statement, queue_for_velocity, trend_for_velocity, KnowledgeNode,
    NodeState, PriorityQueue, VelocityTrend,
};
pub use shapley::{attribute as shapley_attribute, MemberAttribution, ShapleyReport};
pub use source::{Source, SourceType, ANCHOR_TRUST_THRESHOLD};
pub use trace::{
    FinalDecision, PipelinePhase, ThinkingStep, TraceBuilder, TraceStep, ValidationTrace,
    ODIN_VERSION,
};
