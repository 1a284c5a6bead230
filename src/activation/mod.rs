//! Activation Module: From a Frozen Network to Graph Nodes
//!
//! A checkpoint is run over a fixed data subset by an external collaborator
//! (anything implementing [`ActivationSource`]). Each layer yields a block of
//! shape `samples × units`. The [`Extractor`] stitches those blocks into an
//! [`ActivationMatrix`] whose rows are the nodes of the functional graph:
//!
//! - `NodeMode::Neurons`: one node per unit, vector = responses over samples
//! - `NodeMode::Samples`: one node per sample, vector = all unit responses
//!
//! An optional PCA step shrinks the per-node vectors before distances are
//! computed.

mod extractor;
mod reduction;
mod source;

pub use extractor::{ActivationMatrix, Extractor, LayerActivations, NodeMode};
pub use reduction::{pca_project, Reduction};
pub use source::{ActivationSource, InMemorySource, JsonDirSource, SyntheticSource};
