//! Dependency resolution over the scenario graph.
//!
//! The graph is small (tens of nodes) and rebuilt from storage on every
//! request; persisting a derived graph would only risk drift.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use retrace_core::error::{Result, RetraceError};
use retrace_core::model::{Guard, ParameterType, Scenario};
use retrace_storage::ScenarioStore;

/// One scenario in the execution chain, carrying the guard and optionality
/// of the edge that pulled it in. The requested root has neither.
#[derive(Debug, Clone)]
pub struct PlannedScenario {
    pub scenario: Scenario,
    pub guard: Option<Guard>,
    pub optional: bool,
}

pub struct DependencyResolver<'a> {
    store: &'a ScenarioStore,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(store: &'a ScenarioStore) -> Self {
        Self { store }
    }

    /// Resolve the execution chain for `root`: dependencies in topological
    /// order, the requested scenario last. Cycles and missing targets are
    /// referential errors regardless of `include_dependencies`; when it is
    /// false only the root is planned.
    pub fn resolve(&self, root: &str, include_dependencies: bool) -> Result<Vec<PlannedScenario>> {
        let mut cache: BTreeMap<String, Scenario> = BTreeMap::new();
        let mut visiting: Vec<String> = Vec::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut order: Vec<PlannedScenario> = Vec::new();

        self.visit(
            root,
            None,
            false,
            &mut cache,
            &mut visiting,
            &mut visited,
            &mut order,
        )?;

        if !include_dependencies {
            order.retain(|planned| planned.scenario.name == root);
        }
        Ok(order)
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &self,
        name: &str,
        guard: Option<Guard>,
        optional: bool,
        cache: &mut BTreeMap<String, Scenario>,
        visiting: &mut Vec<String>,
        visited: &mut BTreeSet<String>,
        order: &mut Vec<PlannedScenario>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if let Some(position) = visiting.iter().position(|entry| entry == name) {
            let mut path: Vec<String> = visiting[position..].to_vec();
            path.push(name.to_string());
            return Err(RetraceError::DependencyCycle { path });
        }

        let scenario = match cache.get(name) {
            Some(scenario) => scenario.clone(),
            None => {
                let loaded = self.store.load(name).map_err(|error| match error {
                    RetraceError::ScenarioNotFound(_) if !visiting.is_empty() => {
                        RetraceError::DependencyNotFound {
                            scenario: visiting.last().cloned().unwrap_or_default(),
                            dependency: name.to_string(),
                        }
                    }
                    other => other,
                })?;
                cache.insert(name.to_string(), loaded.clone());
                loaded
            }
        };

        visiting.push(name.to_string());
        for dependency in &scenario.metadata.dependencies {
            self.visit(
                &dependency.scenario,
                dependency.condition.clone(),
                dependency.optional,
                cache,
                visiting,
                visited,
                order,
            )?;
        }
        visiting.pop();
        visited.insert(name.to_string());

        order.push(PlannedScenario {
            scenario,
            guard,
            optional,
        });
        Ok(())
    }

    /// Walk the chain in order, maintaining the set of available parameters.
    /// Missing required parameters are errors; type mismatches are warnings.
    /// Declared outputs join the set symbolically.
    pub fn validate_parameters(
        &self,
        planned: &[PlannedScenario],
        provided: &BTreeMap<String, Value>,
    ) -> Result<Vec<String>> {
        let mut available: BTreeSet<String> = provided.keys().cloned().collect();
        let mut warnings = Vec::new();

        for plan in planned {
            let scenario = &plan.scenario;
            let bound: BTreeSet<&str> = scenario
                .metadata
                .dependencies
                .iter()
                .flat_map(|dependency| dependency.parameters.iter())
                .filter(|(_, binding)| available.contains(&binding.output))
                .map(|(name, _)| name.as_str())
                .collect();

            let stored_secrets = self.store.secrets().get(&scenario.name)?;

            for (name, spec) in &scenario.metadata.parameters {
                let satisfied = available.contains(name)
                    || bound.contains(name.as_str())
                    || spec.default.is_some()
                    || stored_secrets
                        .as_ref()
                        .is_some_and(|secrets| secrets.contains_key(name));
                if spec.required && !satisfied {
                    return Err(RetraceError::MissingParameter {
                        scenario: scenario.name.clone(),
                        parameter: name.clone(),
                    });
                }

                if let Some(value) = provided.get(name)
                    && !type_matches(spec.param_type, value)
                {
                    warnings.push(format!(
                        "parameter '{}' of scenario '{}' expects {:?} but was given {}",
                        name,
                        scenario.name,
                        spec.param_type,
                        type_name(value)
                    ));
                }
            }

            available.extend(scenario.metadata.outputs.iter().cloned());
        }

        Ok(warnings)
    }
}

fn type_matches(expected: ParameterType, value: &Value) -> bool {
    match expected {
        ParameterType::String | ParameterType::File => value.is_string(),
        ParameterType::Number => value.is_number(),
        ParameterType::Boolean => value.is_boolean(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
