use std::collections::HashMap;

use crate::models::{AggregateStat, PerformanceRecord};

struct Accumulator {
    key: String,
    marks_sum: f64,
    attendance_sum: f64,
    count: usize,
}

/// Groups records by a caller-supplied key extractor and produces one
/// AggregateStat per group. Output order is first-seen key order, so results
/// are deterministic for a given input ordering. Empty input yields an empty
/// vec; a group is only ever created together with its first record, so
/// count >= 1 holds before any division.
pub fn aggregate_by<'a, F>(records: &'a [PerformanceRecord], key_of: F) -> Vec<AggregateStat>
where
    F: Fn(&'a PerformanceRecord) -> &'a str,
{
    let mut groups: Vec<Accumulator> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();

    for record in records {
        let key = key_of(record);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Accumulator {
                key: key.to_string(),
                marks_sum: 0.0,
                attendance_sum: 0.0,
                count: 0,
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.marks_sum += record.marks;
        group.attendance_sum += record.attendance;
        group.count += 1;
    }

    groups
        .into_iter()
        .map(|group| AggregateStat {
            key: group.key,
            average_marks: group.marks_sum / group.count as f64,
            average_attendance: group.attendance_sum / group.count as f64,
            count: group.count,
        })
        .collect()
}

pub fn by_student(record: &PerformanceRecord) -> &str {
    &record.student_id
}

pub fn by_subject(record: &PerformanceRecord) -> &str {
    &record.subject
}

pub fn by_semester(record: &PerformanceRecord) -> &str {
    &record.semester
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(student: &str, subject: &str, semester: &str, marks: f64, attendance: f64) -> PerformanceRecord {
        PerformanceRecord {
            student_id: student.to_string(),
            subject: subject.to_string(),
            semester: semester.to_string(),
            marks,
            attendance,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn group_means_match_arithmetic_means() {
        let records = vec![
            record("STU001", "Maths", "1", 80.0, 90.0),
            record("STU001", "Physics", "1", 60.0, 70.0),
            record("STU002", "Maths", "1", 40.0, 50.0),
        ];

        let stats = aggregate_by(&records, by_student);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].key, "STU001");
        assert!((stats[0].average_marks - 70.0).abs() < 1e-9);
        assert!((stats[0].average_attendance - 80.0).abs() < 1e-9);
        assert_eq!(stats[0].count, 2);
        assert!((stats[1].average_marks - 40.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let stats = aggregate_by(&[], by_student);
        assert!(stats.is_empty());
    }

    #[test]
    fn grouping_is_insertion_order_stable() {
        let records = vec![
            record("STU003", "Maths", "1", 10.0, 10.0),
            record("STU001", "Maths", "1", 20.0, 20.0),
            record("STU002", "Maths", "1", 30.0, 30.0),
            record("STU001", "Physics", "1", 40.0, 40.0),
        ];

        let keys: Vec<String> = aggregate_by(&records, by_student)
            .into_iter()
            .map(|s| s.key)
            .collect();
        assert_eq!(keys, vec!["STU003", "STU001", "STU002"]);
    }

    #[test]
    fn subject_and_semester_extractors_group_correctly() {
        let records = vec![
            record("STU001", "Maths", "1", 50.0, 60.0),
            record("STU002", "Maths", "2", 70.0, 80.0),
            record("STU003", "Physics", "1", 90.0, 90.0),
        ];

        let by_sub = aggregate_by(&records, by_subject);
        assert_eq!(by_sub.len(), 2);
        assert_eq!(by_sub[0].key, "Maths");
        assert!((by_sub[0].average_marks - 60.0).abs() < 1e-9);

        let by_sem = aggregate_by(&records, by_semester);
        assert_eq!(by_sem.len(), 2);
        assert_eq!(by_sem[0].count, 2);
    }
}
