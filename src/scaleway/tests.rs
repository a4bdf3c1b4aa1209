//! Unit tests for the Scaleway binding's request and response mapping.

use std::collections::HashMap;
use std::net::IpAddr;

use rstest::rstest;
use scaleway_rs::ScalewayImage;
use serde_json::json;

use super::lookup::select_image;
use super::servers::volume_slots;
use super::types::{
    CreateServerRequest, IpsPage, OperationRef, Progress, ServerEnvelope, VolumeBody,
};
use super::*;
use crate::provider::{AddressFamily, OperationId};
use crate::test_support::labels;

struct ImageFields<'a> {
    id: &'a str,
    name: &'a str,
    arch: &'a str,
    state: &'a str,
    creation_date: &'a str,
}

fn image(fields: &ImageFields<'_>) -> ScalewayImage {
    ScalewayImage {
        id: fields.id.to_owned(),
        name: fields.name.to_owned(),
        arch: fields.arch.to_owned(),
        creation_date: fields.creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: fields.state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

fn server_json() -> serde_json::Value {
    json!({
        "server": {
            "id": "srv-1",
            "name": "ci-0",
            "state": "running",
            "tags": ["instance-group=ci", "managed-by=fleeting-scaleway", "legacy"],
            "allowed_actions": ["poweroff", "terminate", "reboot"],
            "public_ips": [
                {"id": "ip-4", "address": "51.15.0.10", "family": "inet"},
                {"id": "ip-6", "address": "2001:bc8::1", "family": "inet6"}
            ],
            "volumes": {
                "0": {"id": "root-vol", "volume_type": "sbs_volume"}
            },
            "commercial_type": "DEV1-S"
        }
    })
}

#[rstest]
#[case("fr-par-1", Some("fr-par"))]
#[case("nl-ams-3", Some("nl-ams"))]
#[case("fr-par", None)]
#[case("par1", None)]
#[case("fr-par-x", None)]
fn zones_resolve_to_regions(#[case] zone: &str, #[case] expected: Option<&str>) {
    assert_eq!(region(zone), expected);
}

#[rstest]
fn server_body_maps_to_record() {
    let envelope: ServerEnvelope = serde_json::from_value(server_json()).expect("decode");
    let server = envelope.server;
    assert!(server.allows("terminate"));
    assert!(!server.allows("poweron"));

    let record = server.into_record();
    assert_eq!(record.id.as_str(), "srv-1");
    assert_eq!(record.status, "running");
    assert_eq!(
        record.labels,
        labels(&[("instance-group", "ci"), ("managed-by", "fleeting-scaleway")])
    );
    assert_eq!(record.public_ipv4, "51.15.0.10".parse::<IpAddr>().ok());
    assert_eq!(record.public_ipv6, "2001:bc8::1".parse::<IpAddr>().ok());
}

#[rstest]
fn extra_volumes_follow_the_root_slot() {
    let envelope: ServerEnvelope = serde_json::from_value(server_json()).expect("decode");
    let slots = volume_slots(&envelope.server, &[VolumeId::new("data-1")]).expect("slots");

    assert_eq!(
        serde_json::to_value(&slots).expect("encode"),
        json!({
            "volumes": {
                "0": {"id": "root-vol", "boot": true, "volume_type": "sbs_volume"},
                "1": {"id": "data-1", "volume_type": "sbs_volume"}
            }
        })
    );
}

#[rstest]
fn servers_without_root_volume_cannot_take_volumes() {
    let mut value = server_json();
    if let Some(volumes) = value.pointer_mut("/server/volumes") {
        *volumes = json!({});
    }
    let envelope: ServerEnvelope = serde_json::from_value(value).expect("decode");
    assert!(volume_slots(&envelope.server, &[VolumeId::new("data-1")]).is_err());
}

#[rstest]
fn create_request_omits_empty_public_ips() {
    let request = CreateServerRequest {
        name: String::from("ci-0"),
        commercial_type: String::from("DEV1-S"),
        image: String::from("img"),
        project: String::from("proj"),
        tags: vec![String::from("instance-group=ci")],
        stopped: true,
        dynamic_ip_required: true,
        routed_ip_enabled: true,
        public_ips: Vec::new(),
    };
    let value = serde_json::to_value(&request).expect("encode");
    assert!(value.get("public_ips").is_none());
    assert_eq!(value.get("stopped"), Some(&json!(true)));
}

#[rstest]
fn flexible_ips_map_to_addresses() {
    let page: IpsPage = serde_json::from_value(json!({
        "ips": [
            {"id": "a", "address": "51.15.0.10", "type": "routed_ipv4", "zone": "fr-par-1",
             "server": {"id": "srv-1", "name": "ci-0"}, "tags": ["pool=ci"]},
            {"id": "b", "prefix": "2001:bc8:1::/64", "type": "routed_ipv6", "zone": "fr-par-1",
             "server": null, "tags": ["pool=ci"]}
        ]
    }))
    .expect("decode");
    let mut ips = page.ips.into_iter();

    let v4 = ips.next().expect("ipv4").into_address();
    assert_eq!(v4.family, AddressFamily::Ipv4);
    assert_eq!(v4.assignee, Some(ServerId::new("srv-1")));
    assert_eq!(v4.location, "fr-par-1");

    let v6 = ips.next().expect("ipv6").into_address();
    assert_eq!(v6.family, AddressFamily::Ipv6);
    assert_eq!(v6.ip, "2001:bc8:1::".parse::<IpAddr>().ok());
    assert_eq!(v6.assignee, None);
}

#[rstest]
fn block_volume_reports_its_server() {
    let volume: VolumeBody = serde_json::from_value(json!({
        "id": "vol-1",
        "name": "ci-0",
        "status": "in_use",
        "tags": ["instance-group=ci"],
        "references": [
            {"product_resource_type": "instance_server", "product_resource_id": "srv-1"}
        ]
    }))
    .expect("decode");
    assert_eq!(Progress::of_volume(&volume.status), Progress::Done);

    let record = volume.into_record();
    assert_eq!(record.server, Some(ServerId::new("srv-1")));
    assert_eq!(record.labels, labels(&[("instance-group", "ci")]));
}

#[rstest]
#[case("task:abc", Some(OperationRef::Task("abc")))]
#[case("volume:v-1", Some(OperationRef::Volume("v-1")))]
#[case("task:", None)]
#[case("snapshot:s", None)]
#[case("abc", None)]
fn operation_handles_parse(#[case] raw: &str, #[case] expected: Option<OperationRef<'static>>) {
    let id = OperationId::new(raw);
    assert_eq!(OperationRef::parse(&id), expected);
}

#[rstest]
#[case("pending", Progress::Pending)]
#[case("started", Progress::Pending)]
#[case("success", Progress::Done)]
fn task_states_map_to_progress(#[case] status: &str, #[case] expected: Progress) {
    assert_eq!(Progress::of_task(status), expected);
}

#[rstest]
fn failed_tasks_and_volumes_fail() {
    assert!(matches!(Progress::of_task("failure"), Progress::Failed(_)));
    assert!(matches!(Progress::of_volume("error"), Progress::Failed(_)));
    assert_eq!(Progress::of_volume("creating"), Progress::Pending);
}

#[rstest]
fn newest_available_image_wins() {
    let candidates = vec![
        image(&ImageFields {
            id: "old",
            name: "ubuntu_noble",
            arch: "x86_64",
            state: "available",
            creation_date: "2024-01-01T00:00:00Z",
        }),
        image(&ImageFields {
            id: "new",
            name: "ubuntu_noble",
            arch: "x86_64",
            state: "available",
            creation_date: "2025-01-01T00:00:00Z",
        }),
        image(&ImageFields {
            id: "broken",
            name: "ubuntu_noble",
            arch: "x86_64",
            state: "error",
            creation_date: "2026-01-01T00:00:00Z",
        }),
        image(&ImageFields {
            id: "arm",
            name: "ubuntu_noble",
            arch: "arm64",
            state: "available",
            creation_date: "2026-01-01T00:00:00Z",
        }),
    ];
    let chosen = select_image(candidates, "ubuntu_noble", "x86_64").expect("image");
    assert_eq!(chosen.id, "new");
    assert_eq!(chosen.architecture, "x86_64");
}

#[rstest]
fn exact_image_name_beats_prefix_match() {
    let candidates = vec![
        image(&ImageFields {
            id: "gpu",
            name: "ubuntu_noble_gpu",
            arch: "x86_64",
            state: "available",
            creation_date: "2026-01-01T00:00:00Z",
        }),
        image(&ImageFields {
            id: "plain",
            name: "ubuntu_noble",
            arch: "x86_64",
            state: "available",
            creation_date: "2024-01-01T00:00:00Z",
        }),
    ];
    let chosen = select_image(candidates, "ubuntu_noble", "x86_64").expect("image");
    assert_eq!(chosen.id, "plain");
}

#[rstest]
fn no_matching_image_yields_none() {
    assert_eq!(select_image(Vec::new(), "ubuntu_noble", "x86_64"), None);
}

#[rstest]
fn credentials_debug_redacts_secret() {
    let credentials = ScalewayCredentials {
        secret_key: String::from("super-secret"),
        project_id: String::from("proj"),
        organization_id: None,
    };
    let rendered = format!("{credentials:?}");
    assert!(!rendered.contains("super-secret"));
    assert!(rendered.contains("proj"));
}

#[rstest]
fn provider_reports_its_zone() {
    let provider = ScalewayProvider::new(ScalewayCredentials::default(), "nl-ams-1")
        .with_timing(Duration::from_millis(10), Duration::from_secs(1));
    assert_eq!(provider.zone(), "nl-ams-1");
}
