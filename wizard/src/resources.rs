//! Cluster, VPC, subnet and security group questions, including creation of
//! a cluster or of a VPC stack when the operator has none to reuse.

use std::ops::RangeInclusive;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::display::list_to_string;
use crate::core::names::{DEFAULT_VPC_STACK_NAME, is_valid_cluster_name};
use crate::core::property::{PropertyKey, PropertyValue};
use crate::core::stack::{NetworkOutputs, network_outputs};
use crate::core::state::NetworkSelection;
use crate::handlers::Answer;
use crate::io::provider::{Provider, ProviderError};
use crate::io::template::{DEFAULT_AVAILABILITY_ZONES, MAX_AVAILABILITY_ZONES, NetworkTemplateParams};
use crate::provisioning::{Settled, TerminalResult, classify_settled, wait_until_settled};
use crate::selector::{Source, StackNamePrompt, ask_for_stack_name, choose_source, select_many};
use crate::session::{Collaborators, Session};

const HELP_MESSAGE: &str = "Please contact support@cloudreactor.io for help.";
const CREATE_CLUSTER_CHOICE: &str = "Create new ECS cluster ...";
const CREATE_VPC_CHOICE: &str = "Create a new VPC ...";

pub fn ask_for_cluster(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    let Some(provider) = deps.provider(session, "selecting an ECS cluster") else {
        return Ok(Answer::Cancelled);
    };
    let region = session
        .state
        .text(PropertyKey::AwsRegion)
        .unwrap_or_default()
        .to_string();

    let clusters = match provider.list_clusters() {
        Ok(clusters) => clusters,
        Err(err) => {
            warn!(err = %err, "can't list clusters");
            deps.console.say(&format!("Failed to list ECS clusters: {err}\n"));
            Vec::new()
        }
    };

    let arn = if clusters.is_empty() {
        let question =
            format!("No ECS clusters found in region {region}. Do you want to create one?");
        if deps.console.confirm(&question) != Some(true) {
            return Ok(Answer::Cancelled);
        }
        create_cluster(deps, provider.as_ref(), &region)
    } else {
        let current = session.state.text(PropertyKey::ClusterArn).map(str::to_string);
        let mut arns = clusters;
        let mut choices = Vec::with_capacity(arns.len() + 1);
        if let Some(current) = &current {
            if let Some(position) = arns.iter().position(|arn| arn == current) {
                let arn = arns.remove(position);
                arns.insert(0, arn);
                choices.push(format!("{current} (current)"));
            }
        }
        choices.extend(arns.iter().skip(choices.len()).cloned());
        choices.push(CREATE_CLUSTER_CHOICE.to_string());

        let Some(index) = deps
            .console
            .select("Which ECS cluster do you want to use to run your tasks?", &choices)
        else {
            return Ok(Answer::Cancelled);
        };
        match arns.get(index) {
            Some(arn) => Some(arn.clone()),
            None => create_cluster(deps, provider.as_ref(), &region),
        }
    };

    let Some(arn) = arn else {
        return Ok(Answer::Cancelled);
    };
    deps.console.say(&format!("Using ECS cluster '{arn}'.\n"));
    session.update(PropertyKey::ClusterArn, PropertyValue::text(arn))?;
    Ok(Answer::Set)
}

fn create_cluster(deps: &mut Collaborators<'_>, provider: &dyn Provider, region: &str) -> Option<String> {
    let name = loop {
        let Some(name) = deps.console.text("What do you want to name the ECS cluster?") else {
            deps.console.say("Skipping ECS cluster creation.\n");
            return None;
        };
        if is_valid_cluster_name(&name) {
            break name;
        }
        deps.console.say(&format!(
            "'{name}' is not a valid ECS cluster name. Cluster names can only contain alphanumeric characters and dashes, no underscores."
        ));
    };

    deps.console.say(&format!("Creating ECS cluster '{name}' ..."));
    match provider.create_cluster(&name) {
        Ok(arn) => {
            info!(cluster = %arn, "created cluster");
            deps.console.say(&format!(
                "Successfully created ECS cluster {arn} in region {region}.\n"
            ));
            Some(arn)
        }
        Err(err) => {
            warn!(err = %err, "failed to create cluster");
            deps.console.say(&format!("Failed to create ECS cluster: {err}"));
            None
        }
    }
}

type ListCandidates = fn(&dyn Provider, &str) -> Result<Vec<(String, String)>, ProviderError>;

/// Wording and listing for one of the network-scoped list properties.
struct ListQuestion {
    key: PropertyKey,
    noun: &'static str,
    intro: &'static str,
    create_label: &'static str,
    select_label: &'static str,
    skip_label: &'static str,
    add_question: &'static str,
    done_label: &'static str,
    selection_intro: &'static str,
    candidates: ListCandidates,
}

const SUBNETS: ListQuestion = ListQuestion {
    key: PropertyKey::Subnets,
    noun: "subnets",
    intro: "
ECS Tasks require subnets to run in. For more information see https://cloudonaut.io/fargate-networking-101/
If you have existing subnets that contain AWS resources your tasks need to access, you should select them below.
If you don't have existing subnets, this wizard can create them for you now.
You can also choose to skip this step and enter the subnets after the Run Environment has been created.
",
    create_label: "Create a new VPC which includes subnets",
    select_label: "Select existing subnet(s)",
    skip_label: "Skip subnets",
    add_question: "Choose a subnet to add:",
    done_label: "Done selecting subnets",
    selection_intro: "
You can select one or more subnets to use to run ECS tasks.
Normally these subnets should be private, unless you need to allow inbound access from the public internet like a web server.
",
    candidates: subnet_candidates,
};

const SECURITY_GROUPS: ListQuestion = ListQuestion {
    key: PropertyKey::SecurityGroups,
    noun: "security groups",
    intro: "
ECS Tasks require at least one security group that allows outbound access to the public internet.
If you have existing security groups you want to assign to your tasks by default, you should select them below.
If you don't have an existing security group, this wizard can create it for you now.
You can also choose to skip this step and enter the security groups after the Run Environment has been created.
",
    create_label: "Create a new VPC which includes a default security group",
    select_label: "Select existing security group(s)",
    skip_label: "Skip security groups",
    add_question: "Choose a security group to add:",
    done_label: "Done selecting security groups",
    selection_intro: "
You can select one or more security groups here. Most likely you only need a single one,
which allows outbound access to the public internet.
",
    candidates: security_group_candidates,
};

fn subnet_candidates(
    provider: &dyn Provider,
    network_id: &str,
) -> Result<Vec<(String, String)>, ProviderError> {
    Ok(provider
        .list_subnets(network_id)?
        .into_iter()
        .map(|subnet| {
            let label = subnet.choice_label();
            (subnet.id, label)
        })
        .collect())
}

fn security_group_candidates(
    provider: &dyn Provider,
    network_id: &str,
) -> Result<Vec<(String, String)>, ProviderError> {
    Ok(provider
        .list_security_groups(network_id)?
        .into_iter()
        .map(|group| {
            let label = group.choice_label();
            (group.id, label)
        })
        .collect())
}

pub fn ask_for_subnets(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    ask_for_network_list(session, deps, &SUBNETS)
}

pub fn ask_for_security_groups(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    ask_for_network_list(session, deps, &SECURITY_GROUPS)
}

#[instrument(skip_all, fields(key = %question.key))]
fn ask_for_network_list(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
    question: &ListQuestion,
) -> Result<Answer> {
    deps.console.say(question.intro);

    let previous = session.state.list(question.key).map(<[String]>::to_vec);
    let mut options = Vec::with_capacity(4);
    if let Some(previous) = &previous {
        options.push((
            Source::Previous,
            format!(
                "Use previously entered {}: {}",
                question.noun,
                list_to_string(Some(previous))
            ),
        ));
    }
    options.push((Source::CreateNew, question.create_label.to_string()));
    options.push((Source::SelectExisting, question.select_label.to_string()));
    options.push((Source::Skip, question.skip_label.to_string()));

    let prompt = format!("How would you like to specify {}?", question.noun);
    let Some(source) = choose_source(deps.console, &prompt, &options) else {
        return Ok(Answer::Cancelled);
    };

    match source {
        Source::Previous => {
            deps.console.say(&format!(
                "Using previously entered {} {}.\n",
                question.noun,
                list_to_string(previous.as_deref())
            ));
            Ok(Answer::Set)
        }
        Source::Skip => {
            deps.console.say(&format!(
                "Skipping {} for now. You can add them manually later.\n",
                question.noun
            ));
            session.update(question.key, PropertyValue::List(Vec::new()))?;
            Ok(Answer::Set)
        }
        Source::CreateNew => Ok(match create_network(session, deps)? {
            Some(_) => Answer::Set,
            None => Answer::Cancelled,
        }),
        Source::SelectExisting => select_in_network(session, deps, question),
    }
}

fn select_in_network(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
    question: &ListQuestion,
) -> Result<Answer> {
    let purpose = format!("selecting {}", question.noun);
    let Some(provider) = deps.provider(session, &purpose) else {
        return Ok(Answer::Cancelled);
    };
    let network_id = match ask_for_network(session, deps, provider.as_ref())? {
        None => return Ok(Answer::Cancelled),
        Some(NetworkChoice::Created) => return Ok(Answer::Set),
        Some(NetworkChoice::Existing(network_id)) => network_id,
    };

    let candidates = match (question.candidates)(provider.as_ref(), &network_id) {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(err = %err, network = %network_id, "can't list network resources");
            deps.console
                .say(&format!("Failed to list {} in VPC {network_id}: {err}\n", question.noun));
            return Ok(Answer::Cancelled);
        }
    };
    if candidates.is_empty() {
        deps.console
            .say(&format!("No {} were found in VPC {network_id}.\n", question.noun));
        return Ok(Answer::Cancelled);
    }

    deps.console.say(question.selection_intro);
    let Some(selected) = select_many(deps.console, question.add_question, question.done_label, candidates)
    else {
        deps.console.say(&format!("Skipping {} for now.", question.noun));
        return Ok(Answer::Cancelled);
    };
    deps.console.say(&format!(
        "Using {} {}",
        question.noun,
        list_to_string(Some(&selected))
    ));
    session.update(question.key, PropertyValue::List(selected))?;
    Ok(Answer::Set)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkChoice {
    Existing(String),
    /// A new VPC stack was created and its outputs already stored.
    Created,
}

/// Pick the VPC to select subnets or security groups from, or create one.
pub fn ask_for_network(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
    provider: &dyn Provider,
) -> Result<Option<NetworkChoice>> {
    let networks = match provider.list_networks() {
        Ok(networks) => networks,
        Err(err) => {
            warn!(err = %err, "can't list VPCs");
            deps.console.say(&format!("Failed to list VPCs: {err}\n"));
            return Ok(None);
        }
    };

    if networks.is_empty() {
        if deps.console.confirm("Create a new VPC?") != Some(true) {
            return Ok(None);
        }
        return Ok(create_network(session, deps)?.map(|_| NetworkChoice::Created));
    }

    let current = session
        .state
        .network
        .as_ref()
        .map(|network| network.vpc_id.clone());
    let mut ids: Vec<String> = networks.into_iter().map(|network| network.id).collect();
    let mut choices = Vec::with_capacity(ids.len() + 1);
    if let Some(current) = &current {
        if let Some(position) = ids.iter().position(|id| id == current) {
            let id = ids.remove(position);
            ids.insert(0, id);
            choices.push(format!("{current} (current)"));
        }
    }
    choices.extend(ids.iter().skip(choices.len()).cloned());
    choices.push(CREATE_VPC_CHOICE.to_string());

    let Some(index) = deps.console.select("Which VPC do you want to use?", &choices) else {
        return Ok(None);
    };
    let Some(vpc_id) = ids.get(index).cloned() else {
        return Ok(create_network(session, deps)?.map(|_| NetworkChoice::Created));
    };

    if current.as_deref() != Some(vpc_id.as_str()) {
        session.state.network = Some(NetworkSelection {
            vpc_id: vpc_id.clone(),
            created_by_wizard: false,
        });
        session.save()?;
    }
    Ok(Some(NetworkChoice::Existing(vpc_id)))
}

fn ask_for_bounded_number(
    deps: &mut Collaborators<'_>,
    question: &str,
    range: RangeInclusive<u8>,
    default: u8,
    error: &str,
) -> Option<u8> {
    loop {
        let answer = deps.console.text(question)?;
        if answer.is_empty() {
            return Some(default);
        }
        match answer.parse::<u8>() {
            Ok(n) if range.contains(&n) => return Some(n),
            _ => deps.console.say(error),
        }
    }
}

/// Create a VPC stack with subnets and a default security group.
///
/// On success the network selection, subnets and security groups are all
/// stored. `None` when the operator went back or the stack failed.
#[instrument(skip_all)]
pub fn create_network(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
) -> Result<Option<NetworkOutputs>> {
    deps.console.say(
        "
This wizard can create a VPC suitable for running ECS tasks, along with subnets and a security group.
For more information, see https://docs.aws.amazon.com/vpc/latest/userguide/VPC_Subnets.html
",
    );

    let Some(credentials) = session.credentials() else {
        deps.console
            .say("You must set your AWS credentials before creating a VPC.\n");
        return Ok(None);
    };
    let Some(provider) = deps.provider(session, "creating a VPC") else {
        return Ok(None);
    };

    let Some(az_count) = ask_for_bounded_number(
        deps,
        "How many availability zones do you want to use? [2]",
        1..=MAX_AVAILABILITY_ZONES,
        DEFAULT_AVAILABILITY_ZONES,
        "The number of availability zones must be between 1 and 3.",
    ) else {
        return Ok(None);
    };
    let Some(second_octet) = ask_for_bounded_number(
        deps,
        "The subnets will be in the range 10.[n].0.0/16. What should n be? [0]",
        0..=u8::MAX,
        0,
        "n should be between 0 and 255.",
    ) else {
        return Ok(None);
    };

    let template = deps
        .templates
        .render_network(&NetworkTemplateParams {
            az_count,
            second_octet,
        })
        .context("render network template")?;

    let stacks = match provider.list_stacks() {
        Ok(stacks) => stacks,
        Err(err) => {
            warn!(err = %err, "can't list stacks");
            deps.console
                .say(&format!("Failed to list CloudFormation stacks: {err}\n"));
            return Ok(None);
        }
    };
    let prompt = StackNamePrompt {
        purpose: " to create a VPC",
        default_name: DEFAULT_VPC_STACK_NAME.to_string(),
        previously_installed: None,
        intro: None,
    };
    let Some(choice) = ask_for_stack_name(deps.console, &stacks, &prompt) else {
        deps.console.say("Skipping VPC creation for now.\n");
        return Ok(None);
    };

    let (stack_id, unchanged) =
        match provider.create_network_stack(&choice.name, template, choice.update_target.clone()) {
            Ok(stack_id) => {
                deps.console.say(&format!(
                    "Started CloudFormation VPC template installation for VPC stack '{}', stack ID is {stack_id}.",
                    choice.name
                ));
                (stack_id, false)
            }
            Err(err) if err.is_no_updates() && choice.update_target.is_some() => {
                deps.console.say(&format!(
                    "No stack updates were necessary. Using existing stack name '{}'.\n",
                    choice.name
                ));
                (choice.update_target.clone().unwrap_or_default(), true)
            }
            Err(err) => {
                warn!(err = %err, stack = %choice.name, "failed to install VPC stack");
                deps.console.say(&format!("Failed to install stack: {err}"));
                if choice.update_target.is_none()
                    && err.is_already_exists()
                    && deps.console.confirm("That stack already exists. Delete it?") == Some(true)
                {
                    if let Err(err) = provider.delete_stack(&choice.name) {
                        deps.console.say(&format!(
                            "Can't delete CloudFormation stack '{}', error = {err}\n",
                            choice.name
                        ));
                    }
                }
                deps.console
                    .say("Can't create or update VPC CloudFormation stack.\n");
                return Ok(None);
            }
        };

    let result = match wait_until_settled(deps, &credentials, &stack_id) {
        Settled::Stack(description) if unchanged => TerminalResult::Succeeded(description),
        other => classify_settled(other),
    };

    let outputs = match result {
        TerminalResult::Succeeded(description) => match network_outputs(&description) {
            Ok(outputs) => outputs,
            Err(missing) => {
                warn!(missing = ?missing, "VPC stack succeeded without required outputs");
                deps.console.say(&format!(
                    "Something was missing from the stack output ({}). {HELP_MESSAGE}\n",
                    missing.join(", ")
                ));
                return Ok(None);
            }
        },
        TerminalResult::Failed { status, reason } => {
            deps.console.say(&format!(
                "The VPC stack upload failed with status '{status}' and status reason '{}'.",
                reason.unwrap_or_else(|| "(Unknown)".to_string())
            ));
            return Ok(None);
        }
        TerminalResult::Missing => {
            deps.console.say(&format!(
                "CloudFormation stack '{}' was deleted, please check your settings and try again.\n",
                choice.name
            ));
            return Ok(None);
        }
        TerminalResult::Cancelled => {
            deps.console.say("Stopped waiting for the VPC CloudFormation stack.\n");
            return Ok(None);
        }
    };

    session.state.network = Some(NetworkSelection {
        vpc_id: outputs.vpc_id.clone(),
        created_by_wizard: true,
    });
    session.update(PropertyKey::Subnets, PropertyValue::List(outputs.subnets.clone()))?;
    session.update(
        PropertyKey::SecurityGroups,
        PropertyValue::List(outputs.security_groups.clone()),
    )?;
    info!(vpc = %outputs.vpc_id, "created VPC");
    deps.console.say(&format!(
        "Successfully created VPC {} in region {}.",
        outputs.vpc_id, credentials.region
    ));
    Ok(Some(outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::{DEFAULT_SECURITY_GROUP_OUTPUT, PRIVATE_SUBNETS_OUTPUT, VPC_OUTPUT};
    use crate::io::provider::{Network, SecurityGroup, Subnet};
    use crate::test_support::{
        Harness, ProviderScript, Reply, set_credentials, stack_with_status, temp_session,
    };

    fn network(id: &str) -> Network {
        Network {
            id: id.to_string(),
            name: None,
        }
    }

    #[test]
    fn creates_a_cluster_when_none_exist() {
        let (_temp, mut session) = temp_session("production");
        set_credentials(&mut session);
        let mut harness = Harness::new(vec![
            Reply::Confirm(true),
            Reply::Text("bad_name"),
            Reply::Text("tasks"),
        ]);

        let answer = ask_for_cluster(&mut session, &mut harness.collaborators()).expect("cluster");

        assert_eq!(answer, Answer::Set);
        assert_eq!(
            session.state.text(PropertyKey::ClusterArn),
            Some("arn:aws:ecs:us-west-2:123456789012:cluster/tasks")
        );
        assert_eq!(harness.providers.script().created_clusters, vec!["tasks"]);
        assert!(harness.console.said("not a valid ECS cluster name"));
    }

    #[test]
    fn cluster_question_lists_the_current_cluster_first() {
        let (_temp, mut session) = temp_session("production");
        set_credentials(&mut session);
        session
            .update(PropertyKey::ClusterArn, PropertyValue::text("arn:cluster/b"))
            .expect("update");
        let mut harness = Harness::new(vec![Reply::Index(1)]).with_provider(ProviderScript {
            clusters: vec!["arn:cluster/a".to_string(), "arn:cluster/b".to_string()],
            ..Default::default()
        });

        ask_for_cluster(&mut session, &mut harness.collaborators()).expect("cluster");

        assert_eq!(
            harness.console.menus[0],
            vec!["arn:cluster/b (current)", "arn:cluster/a", CREATE_CLUSTER_CHOICE]
        );
        assert_eq!(session.state.text(PropertyKey::ClusterArn), Some("arn:cluster/a"));
    }

    #[test]
    fn cluster_listing_failure_is_reported() {
        let (_temp, mut session) = temp_session("production");
        set_credentials(&mut session);
        let mut harness = Harness::new(vec![Reply::Confirm(false)]).with_provider(ProviderScript {
            cluster_error: Some(ProviderError::Transport("access denied".to_string())),
            ..Default::default()
        });

        let answer = ask_for_cluster(&mut session, &mut harness.collaborators()).expect("cluster");

        assert_eq!(answer, Answer::Cancelled);
        assert!(harness.console.said("Failed to list ECS clusters: "));
        assert!(harness.console.said("access denied"));
        assert!(harness.console.said("No ECS clusters found"));
    }

    #[test]
    fn cluster_question_needs_credentials() {
        let (_temp, mut session) = temp_session("production");
        let mut harness = Harness::new(Vec::new());
        let answer = ask_for_cluster(&mut session, &mut harness.collaborators()).expect("cluster");
        assert_eq!(answer, Answer::Cancelled);
        assert!(harness.console.said("You must set the AWS region"));
    }

    #[test]
    fn skipping_stores_an_empty_list() {
        let (_temp, mut session) = temp_session("production");
        let mut harness = Harness::new(vec![Reply::Choose("Skip subnets")]);
        let answer = ask_for_subnets(&mut session, &mut harness.collaborators()).expect("subnets");
        assert_eq!(answer, Answer::Set);
        assert_eq!(session.state.list(PropertyKey::Subnets), Some(&[][..]));
    }

    #[test]
    fn selects_security_groups_in_an_existing_vpc() {
        let (_temp, mut session) = temp_session("production");
        set_credentials(&mut session);
        let mut harness = Harness::new(vec![
            Reply::Choose("Select existing"),
            Reply::Choose("vpc-2"),
            Reply::Choose("sg-2"),
            Reply::Choose("Done"),
        ])
        .with_provider(ProviderScript {
            networks: vec![network("vpc-1"), network("vpc-2")],
            security_groups: vec![
                SecurityGroup {
                    id: "sg-1".to_string(),
                    name: "default".to_string(),
                },
                SecurityGroup {
                    id: "sg-2".to_string(),
                    name: "tasks".to_string(),
                },
            ],
            ..Default::default()
        });

        let answer =
            ask_for_security_groups(&mut session, &mut harness.collaborators()).expect("groups");

        assert_eq!(answer, Answer::Set);
        assert_eq!(
            session.state.list(PropertyKey::SecurityGroups),
            Some(&["sg-2".to_string()][..])
        );
        assert_eq!(
            session.state.network,
            Some(NetworkSelection {
                vpc_id: "vpc-2".to_string(),
                created_by_wizard: false,
            })
        );
    }

    #[test]
    fn empty_subnet_listing_cancels() {
        let (_temp, mut session) = temp_session("production");
        set_credentials(&mut session);
        let mut harness = Harness::new(vec![Reply::Choose("Select existing"), Reply::Index(0)])
            .with_provider(ProviderScript {
                networks: vec![network("vpc-1")],
                subnets: Vec::<Subnet>::new(),
                ..Default::default()
            });
        let answer = ask_for_subnets(&mut session, &mut harness.collaborators()).expect("subnets");
        assert_eq!(answer, Answer::Cancelled);
        assert!(session.state.get(PropertyKey::Subnets).is_none());
    }

    #[test]
    fn creating_a_vpc_fills_subnets_and_security_groups() {
        let (_temp, mut session) = temp_session("production");
        set_credentials(&mut session);
        let mut created = stack_with_status("arn:stack/ECS-VPC", "CREATE_COMPLETE");
        created.outputs.insert(VPC_OUTPUT.to_string(), "vpc-9".to_string());
        created
            .outputs
            .insert(PRIVATE_SUBNETS_OUTPUT.to_string(), "subnet-1,subnet-2".to_string());
        created
            .outputs
            .insert(DEFAULT_SECURITY_GROUP_OUTPUT.to_string(), "sg-9".to_string());
        let mut harness = Harness::new(vec![
            Reply::Choose("Create a new VPC"),
            Reply::Text("3"),
            Reply::Text("300"),
            Reply::Text("4"),
            Reply::Text(""),
        ])
        .with_provider(ProviderScript {
            describe_results: vec![
                Ok(Some(stack_with_status("arn:stack/ECS-VPC", "CREATE_IN_PROGRESS"))),
                Ok(Some(created)),
            ]
            .into(),
            ..Default::default()
        });

        let answer = ask_for_subnets(&mut session, &mut harness.collaborators()).expect("subnets");

        assert_eq!(answer, Answer::Set);
        assert_eq!(
            session.state.list(PropertyKey::Subnets),
            Some(&["subnet-1".to_string(), "subnet-2".to_string()][..])
        );
        assert_eq!(
            session.state.list(PropertyKey::SecurityGroups),
            Some(&["sg-9".to_string()][..])
        );
        assert!(session.state.network.as_ref().is_some_and(|n| n.created_by_wizard));
        let script = harness.providers.script();
        assert_eq!(script.submitted[0].name, DEFAULT_VPC_STACK_NAME);
        assert_eq!(
            script.submitted[0].template,
            crate::io::provider::TemplateSource::Body(
                "network az_count=3 second_octet=4".to_string()
            )
        );
        assert!(harness.console.said("n should be between 0 and 255."));
    }
}
