#![allow(dead_code)]

use asupersync::Outcome;
use relmodel::FixedPolicy;
use relmodel::prelude::*;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Record {
    Record::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())))
}

pub fn int(v: i64) -> Value {
    Value::BigInt(v)
}

pub fn text(v: &str) -> Value {
    Value::Text(v.to_string())
}

pub fn student_meta() -> EntityMeta {
    EntityMeta::new("Student", "zz_student", "studentId")
        .field("studentId", "student_id")
        .field("studentName", "student_name")
        .field("schoolId", "school_id")
        .field("subjectId", "subject_id")
        .field("teacherId", "teacher_id")
        .field("deletedFlag", "deleted_flag")
        .deleted_flag("deletedFlag")
        .relation_fields([
            "school",
            "schoolDict",
            "subjectDict",
            "totalScore",
            "totalHours",
            "totalCredit",
            "courseStudents",
            "teacher",
            "teacherDict",
            "totalStars",
            "clubFee",
            "clubPaid",
        ])
}

pub fn school_meta() -> EntityMeta {
    EntityMeta::new("School", "zz_school", "schoolId")
        .field("schoolId", "school_id")
        .field("schoolName", "school_name")
        .field("cityId", "city_id")
        .relation_fields(["cityDict"])
}

pub fn score_meta() -> EntityMeta {
    EntityMeta::new("StudentScore", "zz_score", "scoreId")
        .field("scoreId", "score_id")
        .field("studentId", "student_id")
        .field("score", "score")
        .field("term", "term")
}

pub fn course_meta() -> EntityMeta {
    EntityMeta::new("Course", "zz_course", "courseId")
        .field("courseId", "course_id")
        .field("courseName", "course_name")
        .field("credit", "credit")
        .field("deletedFlag", "deleted_flag")
        .deleted_flag("deletedFlag")
}

pub fn course_student_meta() -> EntityMeta {
    EntityMeta::new("CourseStudent", "zz_course_student", "id")
        .field("courseId", "course_id")
        .field("studentId", "student_id")
        .field("hours", "hours")
}

pub fn student_club_meta() -> EntityMeta {
    EntityMeta::new("StudentClub", "zz_student_club", "id")
        .field("studentId", "student_id")
        .field("clubId", "club_id")
        .field("paid", "paid")
}

pub fn teacher_meta() -> EntityMeta {
    EntityMeta::new("Teacher", "zz_teacher", "teacherId")
        .field("teacherId", "teacher_id")
        .field("teacherName", "teacher_name")
        .field("deptId", "dept_id")
        .relation_fields(["deptDict"])
}

pub fn review_meta() -> EntityMeta {
    EntityMeta::new("Review", "zz_review", "reviewId")
        .field("reviewId", "review_id")
        .field("studentId", "student_id")
        .field("stars", "stars")
}

pub fn club_meta() -> EntityMeta {
    EntityMeta::new("Club", "zz_club", "clubId")
        .field("clubId", "club_id")
        .field("clubName", "club_name")
        .field("fee", "fee")
        .field("active", "active")
}

const COURSE_LINK: LinkInfo = LinkInfo::new("CourseStudent", "studentId", "courseId");
const CLUB_LINK: LinkInfo = LinkInfo::new("StudentClub", "studentId", "clubId");

pub const STUDENT_RELATIONS: &[RelationInfo] = &[
    RelationInfo::one_to_one("school", "schoolId", SlaveSource::Local, "School", "schoolId")
        .load_slave_dict(true),
    RelationInfo::dict(
        "schoolDict",
        "schoolId",
        SlaveSource::Local,
        "School",
        "schoolId",
        "schoolName",
    )
    .equal_one_to_one("school"),
    RelationInfo::const_dict("subjectDict", "subjectId", "Subject"),
    RelationInfo::one_to_many_aggregation(
        "totalScore",
        "studentId",
        SlaveSource::Local,
        "StudentScore",
        "studentId",
        0,
        "score",
    ),
    RelationInfo::many_to_many_aggregation(
        "totalHours",
        "studentId",
        SlaveSource::Local,
        "Course",
        "courseId",
        COURSE_LINK,
        "CourseStudent",
        0,
        "hours",
    ),
    RelationInfo::many_to_many_aggregation(
        "totalCredit",
        "studentId",
        SlaveSource::Local,
        "Course",
        "courseId",
        COURSE_LINK,
        "Course",
        0,
        "credit",
    ),
    RelationInfo::many_to_many("courseStudents", "studentId", COURSE_LINK),
    RelationInfo::one_to_one(
        "teacher",
        "teacherId",
        SlaveSource::Remote("teacher-client"),
        "Teacher",
        "teacherId",
    )
    .load_slave_dict(true),
    RelationInfo::dict(
        "teacherDict",
        "teacherId",
        SlaveSource::Remote("teacher-client"),
        "Teacher",
        "teacherId",
        "teacherName",
    )
    .equal_one_to_one("teacher"),
    RelationInfo::one_to_many_aggregation(
        "totalStars",
        "studentId",
        SlaveSource::Remote("review-client"),
        "Review",
        "studentId",
        0,
        "stars",
    ),
    RelationInfo::many_to_many_aggregation(
        "clubFee",
        "studentId",
        SlaveSource::Remote("club-client"),
        "Club",
        "clubId",
        CLUB_LINK,
        "Club",
        0,
        "fee",
    ),
    RelationInfo::many_to_many_aggregation(
        "clubPaid",
        "studentId",
        SlaveSource::Remote("club-client"),
        "Club",
        "clubId",
        CLUB_LINK,
        "StudentClub",
        0,
        "paid",
    ),
];

const LOCAL_DDL: &str = "
    CREATE TABLE zz_student (student_id INTEGER PRIMARY KEY, student_name TEXT, school_id INTEGER,
                             subject_id INTEGER, teacher_id INTEGER, deleted_flag INTEGER);
    CREATE TABLE zz_school (school_id INTEGER PRIMARY KEY, school_name TEXT, city_id INTEGER);
    CREATE TABLE zz_score (score_id INTEGER PRIMARY KEY, student_id INTEGER, score INTEGER, term INTEGER);
    CREATE TABLE zz_course (course_id INTEGER PRIMARY KEY, course_name TEXT, credit INTEGER,
                            deleted_flag INTEGER);
    CREATE TABLE zz_course_student (id INTEGER PRIMARY KEY, course_id INTEGER, student_id INTEGER,
                                    hours INTEGER);
    CREATE TABLE zz_student_club (id INTEGER PRIMARY KEY, student_id INTEGER, club_id INTEGER,
                                  paid INTEGER);
";

const REMOTE_DDL: &str = "
    CREATE TABLE zz_teacher (teacher_id INTEGER PRIMARY KEY, teacher_name TEXT, dept_id INTEGER);
    CREATE TABLE zz_review (review_id INTEGER PRIMARY KEY, student_id INTEGER, stars INTEGER);
    CREATE TABLE zz_club (club_id INTEGER PRIMARY KEY, club_name TEXT, fee INTEGER, active INTEGER);
";

/// A student service wired to local tables and to a separate remote service.
pub struct World {
    pub local_store: Arc<SqliteStore>,
    pub remote_store: Arc<SqliteStore>,
    pub teacher_client: Arc<InProcessClient>,
    pub review_client: Arc<InProcessClient>,
    pub club_client: Arc<InProcessClient>,
    pub config: Arc<ConfigHandle>,
    pub schemas: Arc<SchemaRegistry>,
    /// Shared by every local data service; each rebinds it to its own config.
    pub assembler: Assembler,
    pub students: DataService,
    pub schools: DataService,
}

impl World {
    pub fn new(ignore_remote_errors: bool) -> Self {
        let local_store = Arc::new(SqliteStore::open_memory().expect("open local store"));
        let remote_store = Arc::new(SqliteStore::open_memory().expect("open remote store"));
        local_store.execute_raw(LOCAL_DDL).expect("create local tables");
        remote_store.execute_raw(REMOTE_DDL).expect("create remote tables");
        seed_local(&local_store);
        seed_remote(&remote_store);

        let (teacher_client, review_client, club_client) = remote_side(&remote_store);

        let config = Arc::new(ConfigHandle::new(
            ServiceConfig::new("student").ignore_remote_errors(ignore_remote_errors),
        ));
        let services = Arc::new(ServiceRegistry::new());
        let store: Arc<dyn LocalStore> = local_store.clone();
        let mut student_service = None;
        let mut school_service = None;
        for meta in [
            student_meta(),
            school_meta(),
            score_meta(),
            course_meta(),
            course_student_meta(),
            student_club_meta(),
        ] {
            let service = Arc::new(LocalService::new(Arc::new(meta), Arc::clone(&store)));
            match service.name() {
                "Student" => student_service = Some(Arc::clone(&service)),
                "School" => school_service = Some(Arc::clone(&service)),
                _ => {}
            }
            services.register_local(service);
        }
        for meta in [teacher_meta(), review_meta(), club_meta()] {
            services.register_model(Arc::new(meta));
        }
        services.register_const_dict(ConstDict::new("Subject").entry(7_i64, "Math"));
        services.register_const_dict(ConstDict::new("City").entry(100_i64, "Springfield"));

        let schemas = Arc::new(SchemaRegistry::new(Arc::clone(&services)));
        schemas.declare(EntityDeclaration::new(student_meta()).relations(STUDENT_RELATIONS));
        schemas.declare(
            EntityDeclaration::new(school_meta())
                .relation(RelationInfo::const_dict("cityDict", "cityId", "City")),
        );
        schemas.load_local_relations().expect("load local relations");

        services.register_remote("teacher-client", teacher_client.clone());
        services.register_remote("review-client", review_client.clone());
        services.register_remote("club-client", club_client.clone());
        schemas.load_remote_relations().expect("load remote relations");

        let assembler = Assembler::new(Arc::clone(&schemas), Arc::new(FixedPolicy(false)));
        let students = DataService::new(
            student_service.expect("student service"),
            assembler.clone(),
            Arc::clone(&config),
        );
        let schools = DataService::new(
            school_service.expect("school service"),
            assembler.clone(),
            Arc::clone(&config),
        );

        local_store.clear_history();
        Self {
            local_store,
            remote_store,
            teacher_client,
            review_client,
            club_client,
            config,
            schemas,
            assembler,
            students,
            schools,
        }
    }

    pub fn remote_calls(&self) -> usize {
        self.teacher_client.calls() + self.review_client.calls() + self.club_client.calls()
    }

    pub fn fail_remote(&self, message: Option<&str>) {
        self.teacher_client.fail_with(message);
        self.review_client.fail_with(message);
        self.club_client.fail_with(message);
    }
}

fn seed_local(store: &SqliteStore) {
    store.insert_all(
        "zz_student",
        [
            row(&[
                ("student_id", int(1)),
                ("student_name", text("Ann")),
                ("school_id", int(1)),
                ("subject_id", int(7)),
                ("teacher_id", int(501)),
                ("deleted_flag", int(1)),
            ]),
            row(&[
                ("student_id", int(2)),
                ("student_name", text("Bo")),
                ("school_id", int(2)),
                ("subject_id", int(99)),
                ("teacher_id", int(502)),
                ("deleted_flag", int(1)),
            ]),
            row(&[
                ("student_id", int(3)),
                ("student_name", text("Cy")),
                ("school_id", Value::Null),
                ("subject_id", Value::Null),
                ("teacher_id", Value::Null),
                ("deleted_flag", int(1)),
            ]),
            row(&[
                ("student_id", int(4)),
                ("student_name", text("Dee")),
                ("school_id", int(1)),
                ("subject_id", int(7)),
                ("teacher_id", int(501)),
                ("deleted_flag", int(-1)),
            ]),
        ],
    )
    .expect("seed zz_student");
    store.insert_all(
        "zz_school",
        [
            row(&[("school_id", int(1)), ("school_name", text("North")), ("city_id", int(100))]),
            row(&[("school_id", int(2)), ("school_name", text("South")), ("city_id", int(200))]),
        ],
    )
    .expect("seed zz_school");
    store.insert_all(
        "zz_score",
        [
            row(&[("score_id", int(1)), ("student_id", int(1)), ("score", int(5)), ("term", int(1))]),
            row(&[("score_id", int(2)), ("student_id", int(1)), ("score", int(7)), ("term", int(2))]),
            row(&[("score_id", int(3)), ("student_id", int(2)), ("score", int(3)), ("term", int(1))]),
        ],
    )
    .expect("seed zz_score");
    store.insert_all(
        "zz_course",
        [
            row(&[("course_id", int(10)), ("course_name", text("Algebra")), ("credit", int(3)), ("deleted_flag", int(1))]),
            row(&[("course_id", int(11)), ("course_name", text("Art")), ("credit", int(2)), ("deleted_flag", int(1))]),
            row(&[("course_id", int(12)), ("course_name", text("Latin")), ("credit", int(4)), ("deleted_flag", int(-1))]),
        ],
    )
    .expect("seed zz_course");
    store.insert_all(
        "zz_course_student",
        [
            row(&[("id", int(1)), ("course_id", int(10)), ("student_id", int(1)), ("hours", int(30))]),
            row(&[("id", int(2)), ("course_id", int(11)), ("student_id", int(1)), ("hours", int(20))]),
            row(&[("id", int(3)), ("course_id", int(12)), ("student_id", int(1)), ("hours", int(50))]),
            row(&[("id", int(4)), ("course_id", int(10)), ("student_id", int(2)), ("hours", int(30))]),
        ],
    )
    .expect("seed zz_course_student");
    store.insert_all(
        "zz_student_club",
        [
            row(&[("id", int(1)), ("student_id", int(1)), ("club_id", int(900)), ("paid", int(10))]),
            row(&[("id", int(2)), ("student_id", int(1)), ("club_id", int(901)), ("paid", int(20))]),
            row(&[("id", int(3)), ("student_id", int(2)), ("club_id", int(900)), ("paid", int(5))]),
        ],
    )
    .expect("seed zz_student_club");
}

fn seed_remote(store: &SqliteStore) {
    store.insert_all(
        "zz_teacher",
        [
            row(&[("teacher_id", int(501)), ("teacher_name", text("Ms. Lee")), ("dept_id", int(1))]),
            row(&[("teacher_id", int(502)), ("teacher_name", text("Mr. Kim")), ("dept_id", int(2))]),
        ],
    )
    .expect("seed zz_teacher");
    store.insert_all(
        "zz_review",
        [
            row(&[("review_id", int(1)), ("student_id", int(1)), ("stars", int(4))]),
            row(&[("review_id", int(2)), ("student_id", int(1)), ("stars", int(5))]),
            row(&[("review_id", int(3)), ("student_id", int(2)), ("stars", int(2))]),
        ],
    )
    .expect("seed zz_review");
    store.insert_all(
        "zz_club",
        [
            row(&[("club_id", int(900)), ("club_name", text("Chess")), ("fee", int(10)), ("active", int(1))]),
            row(&[("club_id", int(901)), ("club_name", text("Drama")), ("fee", int(25)), ("active", int(0))]),
        ],
    )
    .expect("seed zz_club");
}

/// The remote service: its own registry, schema and endpoints over `store`.
fn remote_side(store: &Arc<SqliteStore>) -> (Arc<InProcessClient>, Arc<InProcessClient>, Arc<InProcessClient>) {
    let config = Arc::new(ConfigHandle::new(ServiceConfig::new("school-remote")));
    let services = Arc::new(ServiceRegistry::new());
    let store: Arc<dyn LocalStore> = store.clone();
    let mut endpoints = Vec::new();
    let schemas = Arc::new(SchemaRegistry::new(Arc::clone(&services)));
    for meta in [teacher_meta(), review_meta(), club_meta()] {
        services.register_local(Arc::new(LocalService::new(Arc::new(meta), Arc::clone(&store))));
    }
    services.register_const_dict(ConstDict::new("Dept").entry(1_i64, "Science"));
    schemas.declare(
        EntityDeclaration::new(teacher_meta())
            .relation(RelationInfo::const_dict("deptDict", "deptId", "Dept")),
    );
    schemas.load_local_relations().expect("load remote-side relations");
    schemas.load_remote_relations().expect("load remote-side remote relations");
    let assembler = Assembler::new(Arc::clone(&schemas), config.clone());

    for (client, model) in [
        ("teacher-client", "Teacher"),
        ("review-client", "Review"),
        ("club-client", "Club"),
    ] {
        let local = services.local_service(model).expect("remote-side service");
        let data = Arc::new(DataService::new(local, assembler.clone(), Arc::clone(&config)));
        endpoints.push(Arc::new(InProcessClient::new(client, ServiceEndpoint::new(data))));
    }
    let club = endpoints.pop().expect("club client");
    let review = endpoints.pop().expect("review client");
    let teacher = endpoints.pop().expect("teacher client");
    (teacher, review, club)
}

pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("studentId").and_then(Value::as_i64))
        .collect()
}

pub fn field_i64(record: &Record, field: &str) -> Option<i64> {
    record.get(field).and_then(Value::as_i64)
}

pub fn dict_name(record: &Record, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(Value::as_record)
        .and_then(|d| d.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
