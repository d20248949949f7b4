mod common;

use asupersync::runtime::RuntimeBuilder;
use common::*;
use relmodel::prelude::*;

fn students() -> Vec<Record> {
    vec![
        Record::new().with("studentId", 1_i64).with("teacherId", 501_i64),
        Record::new().with("studentId", 2_i64).with("teacherId", 502_i64),
        Record::new().with("studentId", 3_i64).with("teacherId", Value::Null),
    ]
}

fn remote_one_to_one() -> RelationParam {
    RelationParam {
        build_remote_one_to_one: true,
        ..RelationParam::none()
    }
}

fn remote_aggregation() -> RelationParam {
    RelationParam {
        build_remote_aggregation: true,
        ..RelationParam::none()
    }
}

fn teacher_name(record: &Record) -> Option<&str> {
    record
        .get("teacher")
        .and_then(Value::as_record)
        .and_then(|t| t.get("teacherName"))
        .and_then(Value::as_str)
}

#[test]
fn remote_one_to_one_batches_into_one_call() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_one_to_one(), &PredicateMap::new())
                .await,
        );
        assert_eq!(world.teacher_client.operations(), vec!["list_by"]);
        assert_eq!(teacher_name(&batch[0]), Some("Ms. Lee"));
        assert_eq!(teacher_name(&batch[1]), Some("Mr. Kim"));
        assert!(!batch[2].contains("teacher"));
        let lee = batch[0].get("teacher").and_then(Value::as_record).unwrap();
        assert!(!lee.contains("deptDict"));
    });
}

#[test]
fn single_entity_uses_get_by() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let mut one = Record::new().with("studentId", 2_i64).with("teacherId", 502_i64);
        unwrap_outcome(
            world
                .students
                .build_relation_for_data(&cx, &mut one, &remote_one_to_one(), &PredicateMap::new())
                .await,
        );
        assert_eq!(world.teacher_client.operations(), vec!["get_by"]);
        assert_eq!(teacher_name(&one), Some("Mr. Kim"));
    });
}

#[test]
fn remote_slave_resolves_its_dictionaries_on_request() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let request = RelationParam {
            build_remote_one_to_one_with_dict: true,
            ..RelationParam::none()
        };
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &request, &PredicateMap::new())
                .await,
        );
        let lee = batch[0].get("teacher").and_then(Value::as_record).unwrap();
        assert_eq!(dict_name(lee, "deptDict").as_deref(), Some("Science"));
        let kim = batch[1].get("teacher").and_then(Value::as_record).unwrap();
        assert!(!kim.contains("deptDict"));
        assert_eq!(world.teacher_client.calls(), 1);
    });
}

#[test]
fn remote_dictionary_reuses_remote_one_to_one() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let request = RelationParam {
            build_remote_one_to_one: true,
            build_remote_dict: true,
            ..RelationParam::none()
        };
        let mut reused = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut reused, &request, &PredicateMap::new())
                .await,
        );
        assert_eq!(world.teacher_client.calls(), 1);
        assert_eq!(dict_name(&reused[0], "teacherDict").as_deref(), Some("Ms. Lee"));

        let dict_only = RelationParam {
            build_remote_dict: true,
            ..RelationParam::none()
        };
        let mut direct = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut direct, &dict_only, &PredicateMap::new())
                .await,
        );
        assert_eq!(world.teacher_client.calls(), 2);
        for (a, b) in reused.iter().zip(&direct) {
            assert_eq!(a.get("teacherDict"), b.get("teacherDict"));
        }
        assert!(!direct[0].contains("teacher"));
    });
}

#[test]
fn remote_aggregates() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_aggregation(), &PredicateMap::new())
                .await,
        );
        // One-to-many on the remote review service.
        assert_eq!(world.review_client.operations(), vec!["aggregate_by"]);
        assert_eq!(field_i64(&batch[0], "totalStars"), Some(9));
        assert_eq!(field_i64(&batch[1], "totalStars"), Some(2));
        assert!(!batch[2].contains("totalStars"));

        // Fee lives on the remote club; paid lives on the local join table and
        // needs no remote call without a club predicate.
        assert_eq!(world.club_client.operations(), vec!["aggregate_by"]);
        assert_eq!(field_i64(&batch[0], "clubFee"), Some(35));
        assert_eq!(field_i64(&batch[1], "clubFee"), Some(10));
        assert_eq!(field_i64(&batch[0], "clubPaid"), Some(30));
        assert_eq!(field_i64(&batch[1], "clubPaid"), Some(5));
        assert!(!batch[2].contains("clubFee"));
    });
}

#[test]
fn remote_slave_predicates_are_applied_remotely() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let active = Criteria::eq("active", 1_i64).on_model("Club");
        let predicates = PredicateMap::new()
            .add("clubFee", active.clone())
            .add("clubPaid", active);
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_aggregation(), &predicates)
                .await,
        );
        assert_eq!(field_i64(&batch[0], "clubFee"), Some(10));
        assert_eq!(field_i64(&batch[1], "clubFee"), Some(10));
        assert_eq!(field_i64(&batch[0], "clubPaid"), Some(10));
        assert_eq!(field_i64(&batch[1], "clubPaid"), Some(5));
        assert_eq!(
            world.club_client.operations(),
            vec!["aggregate_by", "list_map_by"]
        );
    });
}

#[test]
fn ignored_remote_failure_leaves_field_unset() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(true);

    rt.block_on(async {
        world.teacher_client.fail_with(Some("teacher service down"));
        let request = RelationParam {
            build_remote_one_to_one: true,
            build_remote_aggregation: true,
            ..RelationParam::none()
        };
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &request, &PredicateMap::new())
                .await,
        );
        assert!(batch.iter().all(|r| !r.contains("teacher")));
        // Later relations still resolve.
        assert_eq!(field_i64(&batch[0], "totalStars"), Some(9));
    });
}

#[test]
fn remote_failure_aborts_before_merge() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        world.teacher_client.fail_with(Some("teacher service down"));
        let mut batch = students();
        let err = expect_err(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_one_to_one(), &PredicateMap::new())
                .await,
        );
        assert!(err.is_remote_error());
        assert!(err.to_string().contains("teacher service down"), "{err}");
        assert!(batch.iter().all(|r| !r.contains("teacher")));
    });
}

#[test]
fn transport_failure_follows_the_same_policy() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        world.club_client.set_transport_down(true);
        let mut batch = students();
        let err = expect_err(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_aggregation(), &PredicateMap::new())
                .await,
        );
        assert!(err.is_remote_error());
        assert!(err.to_string().contains("connection refused"), "{err}");
        assert!(batch.iter().all(|r| !r.contains("clubFee")));

        world.config.reload(ServiceConfig::new("student").ignore_remote_errors(true));
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_aggregation(), &PredicateMap::new())
                .await,
        );
        assert!(!batch[0].contains("clubFee"));
        assert_eq!(field_i64(&batch[0], "clubPaid"), Some(30));
    });
}

#[test]
fn full_request_resolves_every_category() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let list = unwrap_outcome(
            world
                .students
                .get_all_list_with_relation(&cx, &RelationParam::full())
                .await,
        );
        assert_eq!(ids(&list), vec![1, 2, 3]);
        let ann = &list[0];
        assert_eq!(dict_name(ann, "schoolDict").as_deref(), Some("North"));
        assert_eq!(dict_name(ann, "subjectDict").as_deref(), Some("Math"));
        assert_eq!(dict_name(ann, "teacherDict").as_deref(), Some("Ms. Lee"));
        assert_eq!(field_i64(ann, "totalScore"), Some(12));
        assert_eq!(field_i64(ann, "totalStars"), Some(9));
        assert!(!ann.contains("courseStudents"));
        assert_eq!(world.teacher_client.calls(), 1);

        let cy = &list[2];
        assert!(!cy.contains("school"));
        assert!(!cy.contains("totalScore"));
    });
}

#[test]
fn each_service_applies_its_own_failure_policy() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(true);
    let strict_config = Arc::new(ConfigHandle::new(
        ServiceConfig::new("student").ignore_remote_errors(false),
    ));
    let strict = DataService::new(
        Arc::clone(world.students.local()),
        world.assembler.clone(),
        Arc::clone(&strict_config),
    );

    rt.block_on(async {
        world.teacher_client.fail_with(Some("teacher service down"));

        let mut lenient_batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut lenient_batch, &remote_one_to_one(), &PredicateMap::new())
                .await,
        );
        assert!(lenient_batch.iter().all(|r| !r.contains("teacher")));

        let mut strict_batch = students();
        let err = expect_err(
            strict
                .build_relation_for_data_list(&cx, &mut strict_batch, &remote_one_to_one(), &PredicateMap::new())
                .await,
        );
        assert!(err.to_string().contains("teacher service down"), "{err}");

        // Reloading one service's config leaves the other alone.
        world.config.reload(ServiceConfig::new("student").ignore_remote_errors(false));
        strict_config.reload(ServiceConfig::new("student").ignore_remote_errors(true));
        let mut batch = students();
        unwrap_outcome(
            strict
                .build_relation_for_data_list(&cx, &mut batch, &remote_one_to_one(), &PredicateMap::new())
                .await,
        );
        let mut batch = students();
        expect_err(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_one_to_one(), &PredicateMap::new())
                .await,
        );
    });
}

#[test]
fn masters_without_join_rows_skip_the_remote_slave() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let active = Criteria::eq("active", 1_i64).on_model("Club");
        let predicates = PredicateMap::new()
            .add("clubFee", active.clone())
            .add("clubPaid", active);
        // Student 3 belongs to no club.
        let mut batch = vec![students().remove(2)];
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_aggregation(), &predicates)
                .await,
        );
        assert_eq!(world.club_client.calls(), 0);
        assert!(!batch[0].contains("clubFee"));
        assert!(!batch[0].contains("clubPaid"));
        // Both relations stopped after projecting the (empty) join rows.
        assert_eq!(world.local_store.statements_on("zz_student_club"), 2);
    });
}

#[test]
fn remote_slave_rejecting_every_candidate_leaves_field_unset() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(false);

    rt.block_on(async {
        let predicates =
            PredicateMap::new().add("clubPaid", Criteria::eq("active", 5_i64).on_model("Club"));
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_aggregation(), &predicates)
                .await,
        );
        assert_eq!(
            world.club_client.operations(),
            vec!["aggregate_by", "list_map_by"]
        );
        assert!(batch.iter().all(|r| !r.contains("clubPaid")));
        // The unfiltered sibling relation is unaffected.
        assert_eq!(field_i64(&batch[0], "clubFee"), Some(35));
        assert_eq!(field_i64(&batch[1], "clubFee"), Some(10));
        // No join-table aggregate ran after the empty answer.
        assert!(
            world
                .local_store
                .executed()
                .iter()
                .filter(|s| s.has_table("zz_student_club"))
                .all(|s| s.group_by.is_none())
        );
    });
}

#[test]
fn ignored_failure_while_filtering_slaves_leaves_field_unset() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let world = World::new(true);

    rt.block_on(async {
        world.club_client.fail_with(Some("club service down"));
        let predicates =
            PredicateMap::new().add("clubPaid", Criteria::eq("active", 1_i64).on_model("Club"));
        let mut batch = students();
        unwrap_outcome(
            world
                .students
                .build_relation_for_data_list(&cx, &mut batch, &remote_aggregation(), &predicates)
                .await,
        );
        assert_eq!(
            world.club_client.operations(),
            vec!["aggregate_by", "list_map_by"]
        );
        assert!(batch.iter().all(|r| !r.contains("clubPaid") && !r.contains("clubFee")));
        assert_eq!(field_i64(&batch[0], "totalStars"), Some(9));
        assert!(
            world
                .local_store
                .executed()
                .iter()
                .filter(|s| s.has_table("zz_student_club"))
                .all(|s| s.group_by.is_none())
        );
    });
}
